mod settings;

pub use settings::{
    config_path, data_dir, log_dir, ApiSettings, Command, Config, NotificationSettings, Settings,
    DATA_DIR_ENV, MIN_POLL_INTERVAL_SECS,
};
