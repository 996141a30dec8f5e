use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbaImage;
use log::{error, info};

/// Image extensions picked up from a folder, in listing order.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Side length of a gallery thumbnail.
pub const THUMBNAIL_SIZE: u32 = 100;

/// A decoded, resized gallery entry.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub image: RgbaImage,
}

/// Lists the images directly inside `dir`.
///
/// Extensions match exactly (`photo.JPG` is skipped). Results are grouped by
/// extension in [`IMAGE_EXTENSIONS`] order, each group sorted by path.
pub fn list_images<P: AsRef<Path>>(dir: P) -> io::Result<Vec<PathBuf>> {
    let mut groups: [Vec<PathBuf>; 3] = Default::default();

    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if let Some(group) = IMAGE_EXTENSIONS.iter().position(|known| *known == ext) {
            groups[group].push(path);
        }
    }

    let images: Vec<PathBuf> = groups
        .into_iter()
        .flat_map(|mut group| {
            group.sort();
            group
        })
        .collect();
    info!("Found {} images in {:?}", images.len(), dir.as_ref());
    Ok(images)
}

/// Decodes each path into a `size`×`size` thumbnail.
///
/// Files that fail to decode are logged and left out.
pub fn load_thumbnails(paths: &[PathBuf], size: u32) -> Vec<Thumbnail> {
    paths
        .iter()
        .filter_map(|path| match image::open(path) {
            Ok(image) => Some(Thumbnail {
                path: path.clone(),
                image: image.resize_exact(size, size, FilterType::Triangle).to_rgba8(),
            }),
            Err(e) => {
                error!("Error loading image {:?}: {}", path, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(20, 10, Rgb([10, 200, 30])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_lists_only_known_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.png", "a.png", "b.png", "z.jpg", "y.jpg"] {
            write_image(dir.path(), name);
        }
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("upper.JPG"), "x").unwrap();
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["y.jpg", "z.jpg", "a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_does_not_recurse() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write_image(&sub, "deep.png");

        assert!(list_images(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory() {
        assert!(list_images("/nonexistent/folder").is_err());
    }

    #[test]
    fn test_thumbnails_skip_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_image(dir.path(), "good.png");
        let bad = dir.path().join("bad.jpg");
        fs::write(&bad, b"garbage").unwrap();
        let also_good = write_image(dir.path(), "other.png");

        let thumbs = load_thumbnails(&[good.clone(), bad, also_good.clone()], THUMBNAIL_SIZE);
        assert_eq!(thumbs.len(), 2);
        assert_eq!(thumbs[0].path, good);
        assert_eq!(thumbs[1].path, also_good);
        assert!(thumbs.iter().all(|t| t.image.dimensions() == (100, 100)));
    }
}
