use medtutor_core::SessionSettings;
use medtutor_core::tutor::DEFAULT_CAPABILITY_TIMEOUT;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported backends for explanation generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
    /// Canned explanations, no network.
    Mock,
}

/// Defines the supported backends for the avatar's voice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechProvider {
    /// The streaming-avatar HTTP proxy.
    Avatar,
    /// Logs every line instead of speaking it.
    Mock,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub explanation_provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub speech_provider: SpeechProvider,
    pub avatar_proxy_url: Option<String>,
    pub avatar_id: String,
    pub avatar_voice_id: String,
    pub question_bank_path: Option<PathBuf>,
    pub session_duration: Duration,
    pub questions_per_session: usize,
    pub capability_timeout: Duration,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

impl Default for Config {
    /// Offline defaults: mock providers and the built-in question bank.
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            explanation_provider: Provider::Mock,
            openai_api_key: None,
            gemini_api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            speech_provider: SpeechProvider::Mock,
            avatar_proxy_url: None,
            avatar_id: "1732323320".to_string(),
            avatar_voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
            question_bank_path: None,
            session_duration: session.duration,
            questions_per_session: session.questions_per_session,
            capability_timeout: DEFAULT_CAPABILITY_TIMEOUT,
            log_level: Level::INFO,
            prompts_path: PathBuf::from("./prompts"),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        let bind_address = parse_var("BIND_ADDRESS", defaults.bind_address)?;

        let provider_str =
            std::env::var("EXPLANATION_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let explanation_provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            "mock" => Provider::Mock,
            other => {
                return Err(ConfigError::InvalidValue(
                    "EXPLANATION_PROVIDER".to_string(),
                    format!("'{other}' is not one of openai, gemini, mock"),
                ));
            }
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or(defaults.chat_model);

        let speech_str = std::env::var("SPEECH_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let speech_provider = match speech_str.to_lowercase().as_str() {
            "avatar" => SpeechProvider::Avatar,
            "mock" => SpeechProvider::Mock,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SPEECH_PROVIDER".to_string(),
                    format!("'{other}' is not one of avatar, mock"),
                ));
            }
        };
        let avatar_proxy_url = std::env::var("AVATAR_PROXY_URL").ok();
        let avatar_id = std::env::var("AVATAR_ID").unwrap_or(defaults.avatar_id);
        let avatar_voice_id = std::env::var("AVATAR_VOICE_ID").unwrap_or(defaults.avatar_voice_id);

        let question_bank_path = std::env::var("QUESTION_BANK_PATH").ok().map(PathBuf::from);

        let session_duration = Duration::from_secs(positive_var(
            "SESSION_DURATION_SECS",
            defaults.session_duration.as_secs(),
        )?);
        let questions_per_session =
            positive_var("QUESTIONS_PER_SESSION", defaults.questions_per_session)?;
        let capability_timeout = Duration::from_secs(positive_var(
            "CAPABILITY_TIMEOUT_SECS",
            defaults.capability_timeout.as_secs(),
        )?);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.prompts_path);

        match explanation_provider {
            Provider::OpenAI if openai_api_key.is_none() => {
                return Err(ConfigError::MissingVar(
                    "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                ));
            }
            Provider::Gemini if gemini_api_key.is_none() => {
                return Err(ConfigError::MissingVar(
                    "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                ));
            }
            _ => {}
        }
        if speech_provider == SpeechProvider::Avatar && avatar_proxy_url.is_none() {
            return Err(ConfigError::MissingVar(
                "AVATAR_PROXY_URL must be set for 'avatar' speech provider".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            explanation_provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            speech_provider,
            avatar_proxy_url,
            avatar_id,
            avatar_voice_id,
            question_bank_path,
            session_duration,
            questions_per_session,
            capability_timeout,
            log_level,
            prompts_path,
        })
    }

    /// Session pacing for every quiz run by this server.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            duration: self.session_duration,
            questions_per_session: self.questions_per_session,
            ..SessionSettings::default()
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn positive_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: Display,
{
    let value = parse_var(name, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("EXPLANATION_PROVIDER");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("CHAT_MODEL");
            env::remove_var("SPEECH_PROVIDER");
            env::remove_var("AVATAR_PROXY_URL");
            env::remove_var("AVATAR_ID");
            env::remove_var("AVATAR_VOICE_ID");
            env::remove_var("QUESTION_BANK_PATH");
            env::remove_var("SESSION_DURATION_SECS");
            env::remove_var("QUESTIONS_PER_SESSION");
            env::remove_var("CAPABILITY_TIMEOUT_SECS");
            env::remove_var("RUST_LOG");
            env::remove_var("PROMPTS_PATH");
        }
    }

    fn set_minimal_env_openai() {
        unsafe {
            env::set_var("EXPLANATION_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    fn test_session_settings_follow_config() {
        let config = Config {
            session_duration: Duration::from_secs(60),
            questions_per_session: 3,
            ..Config::default()
        };

        let settings = config.session_settings();

        assert_eq!(settings.duration, Duration::from_secs(60));
        assert_eq!(settings.questions_per_session, 3);
        assert_eq!(settings.feedback_delay, Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal_openai() {
        clear_env_vars();
        set_minimal_env_openai();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.explanation_provider, Provider::OpenAI);
        assert_eq!(config.openai_api_key, Some("test-openai-key".to_string()));
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.speech_provider, SpeechProvider::Mock);
        assert_eq!(config.avatar_id, "1732323320");
        assert_eq!(config.question_bank_path, None);
        assert_eq!(config.session_duration, Duration::from_secs(900));
        assert_eq!(config.questions_per_session, 10);
        assert_eq!(config.capability_timeout, Duration::from_secs(15));
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.prompts_path, PathBuf::from("./prompts"));
    }

    #[test]
    #[serial]
    fn test_config_from_env_gemini_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("EXPLANATION_PROVIDER", "gemini");
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.explanation_provider, Provider::Gemini);
        assert_eq!(config.gemini_api_key, Some("test-gemini-key".to_string()));
        assert_eq!(config.openai_api_key, None);
    }

    #[test]
    #[serial]
    fn test_config_mock_provider_needs_no_keys() {
        clear_env_vars();
        unsafe {
            env::set_var("EXPLANATION_PROVIDER", "MOCK");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.explanation_provider, Provider::Mock);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("EXPLANATION_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "custom-openai-key");
            env::set_var("CHAT_MODEL", "gpt-4o");
            env::set_var("SPEECH_PROVIDER", "avatar");
            env::set_var("AVATAR_PROXY_URL", "http://localhost:54321/functions/v1/heygen-proxy");
            env::set_var("QUESTION_BANK_PATH", "/data/questions.json");
            env::set_var("SESSION_DURATION_SECS", "300");
            env::set_var("QUESTIONS_PER_SESSION", "5");
            env::set_var("CAPABILITY_TIMEOUT_SECS", "8");
            env::set_var("RUST_LOG", "debug");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.speech_provider, SpeechProvider::Avatar);
        assert_eq!(
            config.avatar_proxy_url.as_deref(),
            Some("http://localhost:54321/functions/v1/heygen-proxy")
        );
        assert_eq!(
            config.question_bank_path,
            Some(PathBuf::from("/data/questions.json"))
        );
        assert_eq!(config.session_duration, Duration::from_secs(300));
        assert_eq!(config.questions_per_session, 5);
        assert_eq!(config.capability_timeout, Duration::from_secs(8));
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.prompts_path, PathBuf::from("/custom/prompts"));
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_and_garbage_numbers() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("QUESTIONS_PER_SESSION", "0");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "QUESTIONS_PER_SESSION");
                assert!(msg.contains("greater than zero"));
            }
            _ => panic!("Expected InvalidValue for QUESTIONS_PER_SESSION"),
        }

        unsafe {
            env::remove_var("QUESTIONS_PER_SESSION");
            env::set_var("SESSION_DURATION_SECS", "fifteen minutes");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SESSION_DURATION_SECS"),
            _ => panic!("Expected InvalidValue for SESSION_DURATION_SECS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_unknown_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("EXPLANATION_PROVIDER", "llama");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "EXPLANATION_PROVIDER");
                assert!(msg.contains("llama"));
            }
            _ => panic!("Expected InvalidValue for EXPLANATION_PROVIDER"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();
        unsafe {
            env::set_var("EXPLANATION_PROVIDER", "openai");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("OPENAI_API_KEY"));
            }
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_gemini_key() {
        clear_env_vars();
        unsafe {
            env::set_var("EXPLANATION_PROVIDER", "gemini");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("GEMINI_API_KEY"));
            }
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_avatar_requires_proxy_url() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("SPEECH_PROVIDER", "avatar");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("AVATAR_PROXY_URL")),
            _ => panic!("Expected MissingVar for AVATAR_PROXY_URL"),
        }
    }
}
