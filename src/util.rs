const CONFIG_PATH: &str = "PROBE_MONITOR_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./config.json";

pub fn get_default_config_path() -> &'static str {
    DEFAULT_CONFIG_PATH
}

/// Config file location, from `PROBE_MONITOR_CONFIG` if set.
pub fn get_config_path() -> String {
    let path_from_env = std::env::var(CONFIG_PATH);
    path_from_env
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| get_default_config_path().to_string())
}
