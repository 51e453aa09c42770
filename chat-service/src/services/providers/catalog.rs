//! Registry of models the gateway will route to.
//!
//! Unknown ids are rejected before any credit is touched; premium-tier
//! models additionally require the caller's premium entitlement.

/// A routable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub is_premium: bool,
}

/// The known model registry.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "google/gemini-2.5-flash",
        name: "Gemini 2.5 Flash",
        is_premium: false,
    },
    ModelInfo {
        id: "google/gemini-2.5-pro",
        name: "Gemini 2.5 Pro",
        is_premium: true,
    },
    ModelInfo {
        id: "deepseek/deepseek-r1:free",
        name: "DeepSeek R1",
        is_premium: true,
    },
    ModelInfo {
        id: "meta-llama/llama-3.3-70b-instruct:free",
        name: "Llama 3.3 70B",
        is_premium: true,
    },
    ModelInfo {
        id: "mistralai/mistral-small-24b-instruct-2501:free",
        name: "Mistral Small 24B",
        is_premium: true,
    },
    ModelInfo {
        id: "qwen/qwen-2.5-72b-instruct:free",
        name: "Qwen 2.5 72B",
        is_premium: true,
    },
];

/// Look up a model by id.
pub fn find(model_id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == model_id)
}
