mod settings;

pub use settings::{APP_NAME, load_settings, load_settings_file, load_settings_store};
