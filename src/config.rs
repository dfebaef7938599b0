//! Runtime tunables. The distilled C API treats several limits as
//! "implementation-defined"; this is where this host defines them.

use serde::Deserialize;

fn default_max_handle_table_size() -> usize {
    32 * 1024
}

fn default_max_wait_many_num_handles() -> usize {
    64
}

fn default_max_message_num_handles() -> usize {
    16
}

fn default_max_shared_memory_num_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_data_pipe_capacity_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_handle_table_size: usize,
    pub max_wait_many_num_handles: usize,
    pub max_message_num_handles: usize,
    pub max_shared_memory_num_bytes: usize,
    pub default_data_pipe_capacity_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_handle_table_size: default_max_handle_table_size(),
            max_wait_many_num_handles: default_max_wait_many_num_handles(),
            max_message_num_handles: default_max_message_num_handles(),
            max_shared_memory_num_bytes: default_max_shared_memory_num_bytes(),
            default_data_pipe_capacity_bytes: default_data_pipe_capacity_bytes(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Config> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.max_handle_table_size > 0);
        assert!(cfg.max_wait_many_num_handles > 0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str("max_wait_many_num_handles = 8\n").unwrap();
        assert_eq!(cfg.max_wait_many_num_handles, 8);
        assert_eq!(
            cfg.max_handle_table_size,
            default_max_handle_table_size()
        );
    }
}
