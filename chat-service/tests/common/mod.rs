//! Shared test harness: spins up the full application against a throwaway
//! SQLite database and the mock provider.

use chat_service::config::{
    BillingConfig, ChatConfig, ChatSettings, DatabaseConfig, JwtConfig, ProviderConfig,
    ProviderKind,
};
use chat_service::models::User;
use chat_service::services::{Database, JwtService};
use chat_service::Application;
use tempfile::TempDir;

pub struct TestApp {
    pub address: String,
    pub db: Database,
    pub jwt: JwtService,
    pub client: reqwest::Client,
    // Held so the database directory outlives the test.
    _db_dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    let db_dir = TempDir::new().expect("Failed to create temp dir");
    let database_url = format!(
        "sqlite://{}/test.db?mode=rwc",
        db_dir.path().to_str().expect("non-utf8 temp path")
    );

    let jwt_config = JwtConfig {
        secret: "test-secret".to_string(),
        access_token_expiry_minutes: 60,
    };

    let config = ChatConfig {
        common: service_core::config::Config { port: 0 },
        database: DatabaseConfig {
            url: database_url,
            max_connections: 5,
        },
        jwt: jwt_config.clone(),
        provider: ProviderConfig {
            kind: ProviderKind::Mock,
            api_key: String::new(),
            base_url: String::new(),
            idle_timeout_secs: 45,
        },
        chat: ChatSettings { turn_cost: 1 },
        billing: BillingConfig {
            webhook_secret: "test-webhook-secret".to_string(),
        },
    };

    let application = Application::build(config)
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", application.port());
    let db = application.db();

    tokio::spawn(application.run_until_stopped());

    TestApp {
        address,
        db,
        jwt: JwtService::new(&jwt_config).expect("Failed to build JWT service"),
        client: reqwest::Client::new(),
        _db_dir: db_dir,
    }
}

impl TestApp {
    /// Create a user directly in the database and mint a token for them.
    pub async fn create_user(
        &self,
        email: &str,
        credits: i64,
        is_premium: bool,
    ) -> (User, String) {
        let user = self
            .db
            .create_user(email, credits, is_premium)
            .await
            .expect("Failed to create user");
        let token = self
            .jwt
            .generate_access_token(&user.user_id, email)
            .expect("Failed to mint token");
        (user, token)
    }

    /// Current credit balance straight from the database.
    pub async fn balance(&self, user_id: &str) -> i64 {
        self.db
            .find_user(user_id)
            .await
            .expect("Failed to query user")
            .expect("User not found")
            .credits
    }

    /// Run a full chat turn and return the parsed SSE event payloads.
    pub async fn chat(
        &self,
        token: &str,
        model: &str,
        conversation_id: &str,
        message: &str,
    ) -> Vec<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/ai/chat", self.address))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "message": message,
                "model": model,
                "conversationId": conversation_id,
            }))
            .send()
            .await
            .expect("Failed to execute request");

        assert!(
            response.status().is_success(),
            "chat request failed: {}",
            response.status()
        );

        let body = response.text().await.expect("Failed to read SSE body");
        parse_sse(&body)
    }
}

/// Parse an SSE body into its JSON data payloads, skipping keep-alives.
pub fn parse_sse(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}
