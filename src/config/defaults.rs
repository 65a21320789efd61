//! Default values for configuration

/// Backend base URL used by debug builds when nothing is configured
pub const DEV_API_URL: &str = "http://localhost:3000";

/// Default backend base URL, taken from `RAGDESK_API_URL` when set
pub fn default_api_url() -> Option<String> {
    std::env::var("RAGDESK_API_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Default request timeout in seconds
pub fn default_request_timeout() -> u64 {
    30
}

/// Delay before the file summary question is sent (milliseconds)
pub fn default_file_prompt_delay() -> u64 {
    800
}

/// Question sent when a file is opened from the explorer
pub fn default_file_prompt_template() -> String {
    "What is the document \"{file}\" about? Give me a detailed summary of its content \
     and then ask me what specific information I need."
        .to_string()
}

/// Title prefix for conversations created from the chat prompt
pub fn default_new_conversation_prefix() -> String {
    "New conversation".to_string()
}

/// Local address the OAuth callback listener binds to
pub fn default_oauth_callback_addr() -> String {
    std::env::var("RAGDESK_OAUTH_CALLBACK_ADDR").unwrap_or_else(|_| "127.0.0.1:5173".to_string())
}

/// Route the backend redirects to after the provider consent screen
pub fn default_oauth_callback_path() -> String {
    "/oauth-success".to_string()
}

/// Linger after a successful OAuth completion (milliseconds)
pub fn default_oauth_success_close() -> u64 {
    1500
}

/// Linger after a failed OAuth completion (milliseconds)
pub fn default_oauth_error_close() -> u64 {
    3000
}

/// How long the CLI waits for the provider consent to come back (seconds)
pub fn default_oauth_wait_timeout() -> u64 {
    300
}
