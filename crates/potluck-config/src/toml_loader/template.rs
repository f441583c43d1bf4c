//! Default TOML config template with inline documentation comments.

pub(crate) fn default_config_toml() -> String {
    r##"# Potluck Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[backend]
# url = "https://your-project.supabase.co"
# anon_key = ""
# access_token = ""            # JWT of a signed-in session
# request_timeout_secs = 30
# heartbeat_interval_secs = 25
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30

[chat]
# table = "messages"
# history_limit = 50           # 1-1000
# typing_channel = "chat-typing"
# typing_event = "typing"
# typing_timeout_ms = 3000
# typing_debounce_ms = 1500    # must not exceed typing_timeout_ms

[recipes]
# table = "recipes"
# image_bucket = "recipe-images"

[logging]
# level = "info"               # trace | debug | info | warn | error
"##
    .to_string()
}
