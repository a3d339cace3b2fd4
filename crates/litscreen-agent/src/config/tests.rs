#[cfg(test)]
mod tests {
    use super::super::*;
    use secrecy::ExposeSecret;

    const CONFIG: &str = r#"
[llm.openai]
api_key = ""

[llm.anthropic]
model = "claude-3-5-sonnet-latest"

[llm.ollama]
base_url = "http://gpu-box:11434"
model = "llama3.1:8b"

[keywords]
topic_a_path = "lists/auroc.txt"
topic_b_path = "lists/auprc.txt"

[corpus]
paths = ["data/crawl"]

[stage2]
backend = "anthropic"
max_excerpt_tokens = 8000
max_output_tokens = 400

[execution]
concurrency = 8
"#;

    #[test]
    fn test_screening_settings_sit_at_top_level() {
        let config = Config::from_toml(CONFIG).unwrap();
        assert_eq!(config.screening.corpus.paths.len(), 1);
        assert_eq!(config.screening.execution.concurrency, 8);
        assert_eq!(config.screening.stage1.backend, "openai");
        assert_eq!(config.screening.stage2.backend, "anthropic");
        assert_eq!(config.screening.stage2.max_excerpt_tokens, 8000);
    }

    #[test]
    fn test_keys_fall_back_to_environment() {
        let config = Config::from_toml(CONFIG).unwrap();
        let backends = config.backend_configs_with(|var| match var {
            "LITSCREEN_OPENAI_API_KEY" => Some("sk-env".to_string()),
            _ => None,
        });

        let openai = &backends["openai"];
        assert_eq!(openai.api_key.as_ref().unwrap().expose_secret(), "sk-env");
        assert!(!backends.contains_key("anthropic"), "remote provider without a key is skipped");
        assert!(backends["ollama"].api_key.is_none());
        assert_eq!(backends["ollama"].base_url.as_deref(), Some("http://gpu-box:11434"));
    }

    #[test]
    fn test_inline_key_wins_over_environment() {
        let toml = CONFIG.replace("api_key = \"\"", "api_key = \"sk-inline\"");
        let config = Config::from_toml(&toml).unwrap();
        let backends = config.backend_configs_with(|_| Some("sk-env".to_string()));
        assert_eq!(backends["openai"].api_key.as_ref().unwrap().expose_secret(), "sk-inline");
        assert_eq!(backends["anthropic"].api_key.as_ref().unwrap().expose_secret(), "sk-env");
    }

    #[test]
    fn test_invalid_screening_settings_are_rejected() {
        let toml = CONFIG.replace("concurrency = 8", "concurrency = 0");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("litscreen.toml")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
