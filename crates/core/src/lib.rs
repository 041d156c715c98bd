pub mod domain;
pub mod extract;
pub mod llm;
pub mod recommend;
pub mod store;

pub mod config {
    use anyhow::Context;

    /// Process configuration, read once at startup and passed explicitly
    /// into each component constructor.
    #[derive(Debug, Clone)]
    pub struct Settings {
        pub openai_api_key: Option<String>,
        pub card_api_base_url: Option<String>,
        pub extract_prompt: Option<String>,
        pub recommend_prompt: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
                card_api_base_url: std::env::var("CARD_API_BASE_URL").ok(),
                extract_prompt: std::env::var("EXTRACT_PROMPT").ok(),
                recommend_prompt: std::env::var("RECOMMEND_PROMPT").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required")
        }

        pub fn require_card_api_base_url(&self) -> anyhow::Result<&str> {
            self.card_api_base_url
                .as_deref()
                .context("CARD_API_BASE_URL is required")
        }
    }
}
