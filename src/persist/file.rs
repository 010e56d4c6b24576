//! Reading and writing snapshots as JSON text.
//!
//! JSON nesting mirrors expression depth. The parser runs without its recursion
//! limit, and both directions grow the stack on demand through `serde_stacker`.

use super::config::SaveOptions;
use super::snapshot::{load, save, ModelSnapshot};
use crate::codec::SerialiseError;
use crate::store::{Mesh, Model, ModelKind, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Serialises a snapshot to `writer`, compact or indented.
pub fn write_snapshot<W: Write>(writer: W, snapshot: &ModelSnapshot, pretty: bool) -> Result<(), SerialiseError> {
    if pretty {
        let mut ser = serde_json::Serializer::pretty(writer);
        snapshot.serialize(serde_stacker::Serializer::new(&mut ser))?;
    } else {
        let mut ser = serde_json::Serializer::new(writer);
        snapshot.serialize(serde_stacker::Serializer::new(&mut ser))?;
    }
    Ok(())
}

/// Parses one snapshot from `reader`. Trailing content other than whitespace is an error.
pub fn read_snapshot<R: Read>(reader: R) -> Result<ModelSnapshot, SerialiseError> {
    let mut de = serde_json::Deserializer::from_reader(reader);
    de.disable_recursion_limit();
    let snapshot = ModelSnapshot::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(snapshot)
}

/// Snapshots `model` and writes it to the path chosen by `options`, returning that path.
///
/// The snapshot is taken before the filesystem is touched, and the file is written
/// to a temporary sibling and renamed into place, so a failed save leaves nothing behind.
#[instrument(skip(model, mesh, variables), fields(model = %model.name))]
pub fn save_to_file(
    model: &Model,
    mesh: Option<&Mesh>,
    variables: Option<&BTreeMap<String, Arc<Symbol>>>,
    options: &SaveOptions,
) -> Result<PathBuf, SerialiseError> {
    let snapshot = save(model, mesh, variables)?;
    let path = options.resolve_path(&model.name);
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(directory)?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        write_snapshot(&mut writer, &snapshot, options.is_pretty())?;
        writer.flush()?;
    }
    staged.persist(&path).map_err(|e| SerialiseError::Io(e.error))?;
    debug!(path = %path.display(), "snapshot written");
    Ok(path)
}

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_from_file(path: impl AsRef<Path>, target: Option<ModelKind>) -> Result<Model, SerialiseError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let snapshot = read_snapshot(reader)?;
    load(&snapshot, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{Evaluator, Value};
    use crate::persist::snapshot::tests::{deep_model, diffusion_model, diffusion_parts, diffusion_variables};
    use std::collections::HashMap;
    use crate::store::mesh::tests::cell_mesh;

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = diffusion_model();
        let options = SaveOptions::new().directory(dir.path()).filename("toy_spm").pretty(true);

        let path = save_to_file(&model, Some(&cell_mesh()), Some(&diffusion_variables()), &options).unwrap();
        assert_eq!(path, dir.path().join("toy_spm.json"));

        let loaded = load_from_file(&path, None).unwrap();
        assert_eq!(loaded.name, model.name);
        assert_eq!(loaded.concatenated_rhs.as_ref(), model.concatenated_rhs.as_ref());
        assert_eq!(loaded.events.len(), model.events.len());
        assert_eq!(loaded.mesh, Some(cell_mesh()));
        assert_eq!(loaded.variables.map(|v| v.len()), Some(diffusion_variables().len()));
    }

    #[test]
    fn test_deep_model_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let options = SaveOptions::new().directory(dir.path()).filename("deep");
        let path = save_to_file(&deep_model(10_000), None, None, &options).unwrap();

        let loaded = load_from_file(&path, None).unwrap();
        let inputs = HashMap::new();
        let value = Evaluator::new(2.5, &[0.0; 4], &inputs).evaluate(&loaded.concatenated_rhs).unwrap();
        assert_eq!(value, Value::Scalar(2.5));

        let mut depth = 0;
        let mut node = &loaded.concatenated_rhs;
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 10_000);
    }

    #[test]
    fn test_trailing_content_is_rejected() {
        let mut text = Vec::new();
        write_snapshot(&mut text, &save(&diffusion_model(), None, None).unwrap(), false).unwrap();
        text.extend_from_slice(b" {}");
        assert!(matches!(read_snapshot(text.as_slice()), Err(SerialiseError::Json(_))));
    }

    #[test]
    fn test_default_filename_is_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_to_file(&diffusion_model(), None, None, &SaveOptions::new().directory(dir.path())).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Toy SPM_"), "{}", name);
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_undiscretised_save_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let model = Model::undiscretised(ModelKind::Spm, diffusion_parts());
        let options = SaveOptions::new().directory(dir.path()).filename("never");

        match save_to_file(&model, None, None, &options) {
            Err(SerialiseError::NotDiscretised { .. }) => {}
            other => panic!("Wrong error type: {:?}", other),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        match load_from_file(dir.path().join("absent.json"), Some(ModelKind::Spm)) {
            Err(SerialiseError::Io(_)) => {}
            other => panic!("Wrong error type: {:?}", other),
        }
    }

    #[test]
    fn test_load_into_chosen_variant() {
        let dir = tempfile::tempdir().unwrap();
        let options = SaveOptions::new().directory(dir.path()).filename("spm");
        let path = save_to_file(&diffusion_model(), None, None, &options).unwrap();
        assert_eq!(load_from_file(&path, Some(ModelKind::Spme)).unwrap().kind, ModelKind::Spme);
    }
}
