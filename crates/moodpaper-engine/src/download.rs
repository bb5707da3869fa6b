use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use moodpaper_contracts::wallpapers::{parse_data_url, GeneratedImage};

use crate::error::DownloadError;

/// Writes the image as `wallpaper-{id}.{ext}` inside `dir`, creating it if
/// needed, and returns the written path.
pub fn save_image(image: &GeneratedImage, dir: &Path) -> Result<PathBuf, DownloadError> {
    let (_, payload) =
        parse_data_url(&image.url).ok_or_else(|| DownloadError::NotInline(image.id.clone()))?;
    let bytes = BASE64.decode(payload.as_bytes())?;
    fs::create_dir_all(dir)?;
    let path = dir.join(image.download_file_name());
    fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use moodpaper_contracts::wallpapers::{data_url, GeneratedImage};

    use super::*;

    fn image(url: String) -> GeneratedImage {
        GeneratedImage {
            id: "gen-5-1".to_string(),
            url,
            prompt: "p".to_string(),
            created_at: 5,
        }
    }

    #[test]
    fn writes_decoded_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("walls");
        let path = save_image(&image(data_url("image/jpeg", &BASE64.encode(b"jpeg"))), &dir)?;
        assert_eq!(path, dir.join("wallpaper-gen-5-1.jpg"));
        assert_eq!(fs::read(&path)?, b"jpeg");
        Ok(())
    }

    #[test]
    fn rejects_remote_and_garbled_urls() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(matches!(
            save_image(&image("https://example.com/x.jpg".to_string()), temp.path()),
            Err(DownloadError::NotInline(_))
        ));
        assert!(matches!(
            save_image(&image(data_url("image/jpeg", "%%%")), temp.path()),
            Err(DownloadError::Decode(_))
        ));
        Ok(())
    }
}
