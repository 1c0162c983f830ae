mod settings;

pub use settings::{
    AlertSettings, Command, Config, HistorySettings, ProjectionSettings, RecordArgs, Settings,
};
