use std::{fs::{self, File}, io::{BufReader, BufWriter}, path::{Path, PathBuf}};

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use undertow_fields::{FieldKey, FieldSet};

use crate::{compress::FieldData, config::CompressionConfig, error::{io_error, DataError}};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    time: f32,
    /// `(nz, ny, nx)`
    shape: [usize; 3],
    fields: Vec<StoredField>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredField {
    key: FieldKey,
    data: FieldData,
}

/// On-disk store of one entry per validated frame, keyed by run name and frame index.
///
/// Entries are written once and never modified, so concurrent readers need no locking.
#[derive(Debug, Clone)]
pub struct FrameCache {
    root: PathBuf,
    compression: CompressionConfig,
}

impl FrameCache {
    pub fn new<P: Into<PathBuf>>(root: P, compression: CompressionConfig) -> Result<FrameCache, DataError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_error(&root))?;

        Ok(Self { root, compression })
    }

    #[inline(always)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, run: &str, frame: usize) -> PathBuf {
        self.root.join(run).join(format!("{frame:06}.bin"))
    }

    pub fn contains(&self, run: &str, frame: usize) -> bool {
        self.entry_path(run, frame).is_file()
    }

    pub fn store(&self, run: &str, frame: usize, fields: &FieldSet) -> Result<(), DataError> {
        let dir = self.root.join(run);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let (nz, ny, nx) = fields.shape();
        let entry = CacheEntry {
            time: fields.time,
            shape: [nz, ny, nx],
            fields: fields
                .iter()
                .map(|(key, field)| StoredField {
                    key,
                    // Owned copy in logical order, independent of the source's memory layout.
                    data: FieldData::encode(field.iter().copied().collect(), &self.compression),
                })
                .collect(),
        };

        let path = self.entry_path(run, frame);
        let mut writer = BufWriter::new(File::create(&path).map_err(io_error(&path))?);
        bincode::serde::encode_into_std_write(&entry, &mut writer, bincode::config::standard())?;

        writer.into_inner().map_err(|e| DataError::Io { path, source: e.into_error() })?;

        Ok(())
    }

    pub fn load(&self, run: &str, frame: usize) -> Result<FieldSet, DataError> {
        let path = self.entry_path(run, frame);
        let mut reader = BufReader::new(File::open(&path).map_err(io_error(&path))?);
        let entry: CacheEntry = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;

        let [nz, ny, nx] = entry.shape;
        let mut slots: [Option<Array3<f32>>; FieldKey::COUNT] = Default::default();

        for stored in entry.fields {
            if stored.data.value_count() != nz * ny * nx {
                return Err(corrupt(&path, format!("field {} has {} values", stored.key.name(), stored.data.value_count())));
            }

            let field = Array3::from_shape_vec((nz, ny, nx), stored.data.decode())
                .map_err(|e| corrupt(&path, e.to_string()))?;

            if slots[stored.key.index()].replace(field).is_some() {
                return Err(corrupt(&path, format!("field {} is stored twice", stored.key.name())));
            }
        }

        if let Some(key) = FieldKey::ALL.into_iter().find(|key| slots[key.index()].is_none()) {
            return Err(corrupt(&path, format!("field {} is missing", key.name())));
        }

        Ok(FieldSet::from_fn(entry.time, |key| {
            slots[key.index()].take().unwrap_or_else(|| Array3::zeros((nz, ny, nx)))
        }))
    }
}

fn corrupt(path: &Path, reason: String) -> DataError {
    DataError::CorruptEntry {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{s, Array3, Axis};

    use super::*;

    fn sample(time: f32) -> FieldSet {
        FieldSet::from_fn(time, |key| {
            Array3::from_shape_fn((2, 3, 4), |(z, y, x)| key.index() as f32 + 0.01 * (z * 12 + y * 4 + x) as f32)
        })
    }

    #[test]
    fn stored_frames_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FrameCache::new(dir.path(), CompressionConfig::default()).unwrap();
        let fields = sample(0.25);

        cache.store("tr_000001", 3, &fields).unwrap();

        assert!(cache.contains("tr_000001", 3));
        assert!(!cache.contains("tr_000001", 4));
        assert_eq!(cache.load("tr_000001", 3).unwrap(), fields);
    }

    #[test]
    fn compressed_frames_load_back_within_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        let compression = CompressionConfig { enabled: true, accuracy: 1e-5 };
        let cache = FrameCache::new(dir.path(), compression).unwrap();
        let fields = sample(1.0);

        cache.store("run", 0, &fields).unwrap();
        let loaded = cache.load("run", 0).unwrap();

        for (key, field) in fields.iter() {
            let max = field.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            for (a, b) in field.iter().zip(loaded[key].iter()) {
                assert!((a - b).abs() <= 2e-5 * max, "{}: {a} vs {b}", key.name());
            }
        }
    }

    #[test]
    fn non_standard_layouts_are_stored_in_logical_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FrameCache::new(dir.path(), CompressionConfig::default()).unwrap();

        let parent = Array3::from_shape_fn((4, 8, 8), |(z, y, x)| (z * 64 + y * 8 + x) as f32);
        let mut window = parent.slice(s![1..3, 2..5, 3..7]).to_owned();
        window.invert_axis(Axis(2));
        let fields = FieldSet::from_fn(0.0, |_| window.clone());

        cache.store("run", 0, &fields).unwrap();
        let loaded = cache.load("run", 0).unwrap();

        assert_eq!(loaded[FieldKey::Pressure], window);
        assert_eq!(loaded[FieldKey::Geometry][(0, 0, 0)], parent[(1, 2, 6)]);
    }

    #[test]
    fn missing_entry_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FrameCache::new(dir.path(), CompressionConfig::default()).unwrap();

        assert!(matches!(cache.load("run", 9), Err(DataError::Io { .. })));
    }

    #[test]
    fn truncated_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FrameCache::new(dir.path(), CompressionConfig::default()).unwrap();
        cache.store("run", 0, &sample(0.0)).unwrap();

        let path = cache.entry_path("run", 0);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(cache.load("run", 0).is_err());
    }
}
