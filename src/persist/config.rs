use chrono::{DateTime, Local};
use std::path::PathBuf;

const EXTENSION: &str = "json";

/// Where and how `save_to_file` writes a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    directory: Option<PathBuf>,
    filename: Option<String>,
    pretty: bool,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory the file lands in. Defaults to the working directory.
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// File name, with or without the `.json` extension. Defaults to the model
    /// name plus a timestamp.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn resolve_path(&self, model_name: &str) -> PathBuf {
        self.resolve_path_at(model_name, Local::now())
    }

    pub(crate) fn resolve_path_at(&self, model_name: &str, now: DateTime<Local>) -> PathBuf {
        let stem = match &self.filename {
            Some(name) => name.clone(),
            None => default_filename(model_name, now),
        };
        let mut path = self.directory.clone().unwrap_or_default();
        path.push(stem);
        if path.extension().map_or(true, |ext| ext != EXTENSION) {
            let mut with_ext = path.into_os_string();
            with_ext.push(".");
            with_ext.push(EXTENSION);
            path = PathBuf::from(with_ext);
        }
        path
    }
}

/// `<model name>_<YYYY_MM_DD-AMhh_mm_ss>`, without extension.
pub fn default_filename(model_name: &str, now: DateTime<Local>) -> String {
    format!("{}_{}", model_name, now.format("%Y_%m_%d-%p%I_%M_%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use std::path::Path;

    fn afternoon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 15, 4, 9).unwrap()
    }

    #[test]
    fn test_default_filename_uses_timestamp() {
        assert_eq!(default_filename("SPM", afternoon()), "SPM_2024_03_07-PM03_04_09");
    }

    #[rstest]
    #[case(SaveOptions::new(), "SPM_2024_03_07-PM03_04_09.json")]
    #[case(SaveOptions::new().filename("spm"), "spm.json")]
    #[case(SaveOptions::new().filename("spm.json"), "spm.json")]
    #[case(SaveOptions::new().filename("spm.v2"), "spm.v2.json")]
    #[case(SaveOptions::new().directory("out").filename("spm"), "out/spm.json")]
    fn test_resolve_path(#[case] options: SaveOptions, #[case] expected: &str) {
        assert_eq!(options.resolve_path_at("SPM", afternoon()), Path::new(expected));
    }

    #[test]
    fn test_builder_defaults() {
        let options = SaveOptions::new();
        assert!(!options.is_pretty());
        assert!(SaveOptions::new().pretty(true).is_pretty());
    }
}
