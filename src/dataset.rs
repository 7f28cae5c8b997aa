//! COLMAP text metadata and the ordered frame listing of an image directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::camera::Intrinsics;
use crate::error::DatasetError;
use crate::num::{Number, Vector3};

use itertools::Itertools;
use log::debug;
use nalgebra::{Quaternion, UnitQuaternion};

#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    pub camera_id: u32,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub intrinsics: Intrinsics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub image_id: u32,
    /// World-to-camera rotation as recorded by COLMAP.
    pub orientation: UnitQuaternion<Number>,
    pub translation: Vector3,
    pub camera_id: u32,
    /// Name relative to the COLMAP image root.
    pub name: String,
}

/// One image of the sequence, in directory order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub path: PathBuf,
    pub camera_id: u32,
}

/// `CAMERA_ID MODEL WIDTH HEIGHT PARAMS[]`
pub fn read_cameras(path: impl AsRef<Path>) -> Result<BTreeMap<u32, CameraInfo>, DatasetError> {
    let path = path.as_ref();
    let text = read_to_string(path)?;

    let mut cameras = BTreeMap::new();
    for (line_no, line) in data_lines(&text) {
        let err = |message: String| DatasetError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };
        let tokens = line.split_whitespace().collect_vec();
        if tokens.len() < 7 {
            return Err(err(format!("expected at least 7 fields, got {}", tokens.len())));
        }

        let camera_id = parse(tokens[0]).map_err(&err)?;
        let model = tokens[1].to_string();
        let width = parse(tokens[2]).map_err(&err)?;
        let height = parse(tokens[3]).map_err(&err)?;
        let params: Vec<Number> = tokens[4..]
            .iter()
            .map(|token| parse(token))
            .collect::<Result<_, _>>()
            .map_err(&err)?;

        // SIMPLE_* and RADIAL models share one focal length
        let (fx, fy, cx, cy) = if model.starts_with("SIMPLE") || model.starts_with("RADIAL") {
            (params[0], params[0], params[1], params[2])
        } else if params.len() >= 4 {
            (params[0], params[1], params[2], params[3])
        } else {
            return Err(err(format!("model {} needs fx fy cx cy", model)));
        };
        let intrinsics = Intrinsics::new(fx, fy, cx, cy)?;

        cameras.insert(
            camera_id,
            CameraInfo {
                camera_id,
                model,
                width,
                height,
                intrinsics,
            },
        );
    }
    Ok(cameras)
}

/// `IMAGE_ID QW QX QY QZ TX TY TZ CAMERA_ID NAME`, each followed by a line of
/// 2D observations (skipped). Keyed by file name without directories.
pub fn read_images(path: impl AsRef<Path>) -> Result<BTreeMap<String, ImageInfo>, DatasetError> {
    let path = path.as_ref();
    let text = read_to_string(path)?;

    let mut images = BTreeMap::new();
    let mut expect_header = true;
    for (line_no, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l.trim())) {
        if line.starts_with('#') {
            continue;
        }
        if !expect_header {
            // observation line, possibly empty
            expect_header = true;
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let err = |message: String| DatasetError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };
        let tokens = line.split_whitespace().collect_vec();
        if tokens.len() < 10 {
            return Err(err(format!("expected 10 fields, got {}", tokens.len())));
        }

        let values: Vec<Number> = tokens[1..8]
            .iter()
            .map(|token| parse(token))
            .collect::<Result<_, _>>()
            .map_err(&err)?;
        let name = tokens[9..].join(" ");
        let info = ImageInfo {
            image_id: parse(tokens[0]).map_err(&err)?,
            orientation: UnitQuaternion::from_quaternion(Quaternion::new(
                values[0], values[1], values[2], values[3],
            )),
            translation: Vector3::new(values[4], values[5], values[6]),
            camera_id: parse(tokens[8]).map_err(&err)?,
            name: name.clone(),
        };

        let key = Path::new(&name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(name);
        images.insert(key, info);
        expect_header = false;
    }
    Ok(images)
}

/// Number of images recorded for each camera.
pub fn count_images_per_camera(images: &BTreeMap<String, ImageInfo>) -> BTreeMap<u32, usize> {
    images.values().map(|info| info.camera_id).counts().into_iter().collect()
}

/// Sorted listing of `dir`, sliced by `range`, tagged with camera identities.
pub fn list_frames(
    dir: impl AsRef<Path>,
    images: &BTreeMap<String, ImageInfo>,
    range: Option<(usize, usize)>,
) -> Result<Vec<Frame>, DatasetError> {
    let dir = dir.as_ref();
    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let (start, end) = range.unwrap_or((0, names.len()));
    let end = end.min(names.len());
    let start = start.min(end);
    debug!("{} files in {}, using [{}, {})", names.len(), dir.display(), start, end);

    names[start..end]
        .iter()
        .map(|name| {
            let info = images
                .get(name)
                .ok_or_else(|| DatasetError::UnknownImage(name.clone()))?;
            Ok(Frame {
                name: name.clone(),
                path: dir.join(name),
                camera_id: info.camera_id,
            })
        })
        .collect()
}

fn read_to_string(path: &Path) -> Result<String, DatasetError> {
    fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Non-empty, non-comment lines with their 1-based numbers.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse<T: FromStr>(token: &str) -> Result<T, String> {
    token
        .parse()
        .map_err(|_| format!("cannot parse {:?}", token))
}
