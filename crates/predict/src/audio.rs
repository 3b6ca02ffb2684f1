use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{Engine, prelude::BASE64_STANDARD};
use reqwest::{Client, header};
use resonance_config::{AudioFormat, PlatformConfig};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{AudioFetchError, FetchCause};
use crate::platform::PlatformAuth;

/// Local file backing one task's audio
///
/// Files downloaded by the resolver are owned and removed on drop.
/// Pre-existing files are borrowed and left alone.
pub(crate) struct AudioArtifact {
    reference: String,
    path: PathBuf,
    temp: Option<TempPath>,
    extension: Option<String>,
    content_type: Option<String>,
}

/// Why fetched audio cannot be analyzed
#[derive(Debug, thiserror::Error)]
pub(crate) enum UnsupportedAudio {
    #[error("audio file is empty")]
    Empty,
    #[error("unrecognized audio format")]
    Unrecognized,
    #[error("audio format '{0}' is not enabled")]
    Disabled(&'static str),
}

/// Audio ready to send to the model, base64-encoded once per task
pub(crate) struct AudioPayload {
    pub data: String,
    pub format: AudioFormat,
    pub size: usize,
}

impl AudioPayload {
    pub fn new(bytes: &[u8], format: AudioFormat) -> Self {
        Self {
            data: BASE64_STANDARD.encode(bytes),
            format,
            size: bytes.len(),
        }
    }
}

impl AudioArtifact {
    fn borrowed(reference: &str, path: PathBuf) -> Self {
        let extension = extension_of(&path);

        Self {
            reference: reference.to_owned(),
            path,
            temp: None,
            extension,
            content_type: None,
        }
    }

    fn owned(reference: &str, temp: TempPath, extension: Option<String>, content_type: Option<String>) -> Self {
        Self {
            reference: reference.to_owned(),
            path: temp.to_path_buf(),
            temp: Some(temp),
            extension,
            content_type,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file will be removed when the artifact is dropped
    pub const fn is_owned(&self) -> bool {
        self.temp.is_some()
    }

    /// Read the audio and check it is in an enabled format
    pub async fn load(&self, supported: &[AudioFormat]) -> Result<Result<AudioPayload, UnsupportedAudio>, AudioFetchError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| AudioFetchError::new(&self.reference, FetchCause::Io(e)))?;

        Ok(self
            .format(&bytes, supported)
            .map(|format| AudioPayload::new(&bytes, format)))
    }

    /// Determine the format from the file name, then `Content-Type`, then magic bytes
    fn format(&self, bytes: &[u8], supported: &[AudioFormat]) -> Result<AudioFormat, UnsupportedAudio> {
        if bytes.is_empty() {
            return Err(UnsupportedAudio::Empty);
        }

        let format = self
            .extension
            .as_deref()
            .and_then(AudioFormat::from_extension)
            .or_else(|| self.content_type.as_deref().and_then(AudioFormat::from_mime_type))
            .or_else(|| sniff(bytes))
            .ok_or(UnsupportedAudio::Unrecognized)?;

        if supported.contains(&format) {
            Ok(format)
        } else {
            Err(UnsupportedAudio::Disabled(format.extension()))
        }
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };

        match temp.close() {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed temporary audio"),
            Err(e) => tracing::warn!(path = %self.path.display(), "failed to remove temporary audio: {e}"),
        }
    }
}

/// Turns task audio references into local files
pub(crate) struct AudioResolver {
    client: Client,
    auth: PlatformAuth,
    base_url: Url,
    media_root: Option<PathBuf>,
    local_roots: Vec<PathBuf>,
    temp_dir: PathBuf,
    download_timeout: Duration,
    max_download_bytes: u64,
}

impl AudioResolver {
    pub fn new(client: Client, config: &PlatformConfig) -> Self {
        Self {
            auth: PlatformAuth::new(client.clone(), config),
            client,
            base_url: config.base_url.clone(),
            media_root: config.media_root.clone(),
            local_roots: config.local_roots.clone(),
            temp_dir: config.temp_dir(),
            download_timeout: config.download_timeout,
            max_download_bytes: config.max_download_bytes,
        }
    }

    /// Resolve a reference to a local file, downloading it when needed
    pub async fn resolve(&self, reference: &str) -> Result<AudioArtifact, AudioFetchError> {
        let reference = reference.trim();

        if reference.starts_with("blob:") {
            return Err(AudioFetchError::new(reference, FetchCause::BlobReference));
        }

        if let Some(rest) = reference.strip_prefix("file://") {
            let path = Url::parse(reference)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .unwrap_or_else(|| PathBuf::from(rest));

            return match existing_file(&path).await {
                Some(path) => Ok(AudioArtifact::borrowed(reference, path)),
                None => Err(AudioFetchError::new(
                    reference,
                    FetchCause::NotFound(path.display().to_string()),
                )),
            };
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            let url = Url::parse(reference)
                .map_err(|e| AudioFetchError::new(reference, FetchCause::InvalidReference(e.to_string())))?;

            if url.origin() == self.base_url.origin() {
                let internal = match url.query() {
                    Some(query) => format!("{}?{query}", url.path()),
                    None => url.path().to_owned(),
                };
                return self.platform_path(reference, &internal).await;
            }

            return self.download(reference, url, false).await;
        }

        if reference.starts_with('/') {
            return self.platform_path(reference, reference).await;
        }

        self.relative(reference).await
    }

    /// Root-relative reference, either a local path or platform-internal
    async fn platform_path(&self, reference: &str, internal: &str) -> Result<AudioArtifact, AudioFetchError> {
        let (path, query) = internal
            .split_once('?')
            .map_or((internal, None), |(path, query)| (path, Some(query)));

        if let Some(found) = existing_file(Path::new(path)).await {
            return Ok(AudioArtifact::borrowed(reference, found));
        }

        if let (Some(media_root), Some(rest)) = (&self.media_root, path.strip_prefix("/data/upload/"))
            && let Some(relative) = decode_relative(rest)
            && let Some(found) = existing_file(&media_root.join("upload").join(relative)).await
        {
            return Ok(AudioArtifact::borrowed(reference, found));
        }

        if path.trim_end_matches('/') == "/data/local-files"
            && let Some(target) = query.and_then(local_files_target)
            && let Some(found) = self.local_files(&target).await
        {
            return Ok(AudioArtifact::borrowed(reference, found));
        }

        if let Some(found) = self.search(path).await {
            return Ok(AudioArtifact::borrowed(reference, found));
        }

        let url = self.platform_url(internal, reference)?;
        self.download(reference, url, true).await
    }

    /// Reference with no scheme and no leading slash
    async fn relative(&self, reference: &str) -> Result<AudioArtifact, AudioFetchError> {
        if let Some(found) = existing_file(Path::new(reference)).await {
            return Ok(AudioArtifact::borrowed(reference, found));
        }

        if let Some(found) = self.search(reference).await {
            return Ok(AudioArtifact::borrowed(reference, found));
        }

        let url = self.platform_url(&format!("/data/{reference}"), reference)?;
        self.download(reference, url, true).await
    }

    fn platform_url(&self, internal: &str, reference: &str) -> Result<Url, AudioFetchError> {
        let base = self.base_url.as_str().trim_end_matches('/');

        Url::parse(&format!("{base}{internal}"))
            .map_err(|e| AudioFetchError::new(reference, FetchCause::InvalidReference(e.to_string())))
    }

    /// Target of a `/data/local-files/?d=` reference
    async fn local_files(&self, target: &str) -> Option<PathBuf> {
        let path = Path::new(target);

        if path.is_absolute() {
            return existing_file(path).await;
        }

        let relative = decode_relative(target)?;
        for root in &self.local_roots {
            if let Some(found) = existing_file(&root.join(&relative)).await {
                return Some(found);
            }
        }

        None
    }

    /// Look for the file under configured roots, then by name in upload folders
    async fn search(&self, path: &str) -> Option<PathBuf> {
        let relative = decode_relative(path)?;

        for root in &self.local_roots {
            if let Some(found) = existing_file(&root.join(&relative)).await {
                return Some(found);
            }
        }

        let file_name = relative.file_name()?;

        for root in &self.local_roots {
            if let Some(found) = existing_file(&root.join(file_name)).await {
                return Some(found);
            }
        }

        let uploads = self.media_root.as_ref()?.join("upload");
        let mut projects = tokio::fs::read_dir(&uploads).await.ok()?;

        while let Ok(Some(project)) = projects.next_entry().await {
            if let Some(found) = existing_file(&project.path().join(file_name)).await {
                return Some(found);
            }
        }

        None
    }

    /// Stream a remote file into a uniquely named temporary file
    async fn download(&self, reference: &str, url: Url, authenticated: bool) -> Result<AudioArtifact, AudioFetchError> {
        let fail = |cause| AudioFetchError::new(reference, cause);

        tracing::debug!(%url, "downloading audio");

        let mut request = self.client.get(url.clone()).timeout(self.download_timeout);

        if authenticated && let Some(authorization) = self.auth.authorization().await {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let mut response = request.send().await.map_err(|e| fail(transport_cause(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(FetchCause::Status(status.as_u16())));
        }

        let limit = self.max_download_bytes;
        if response.content_length().is_some_and(|length| length > limit) {
            return Err(fail(FetchCause::TooLarge { limit }));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let extension = extension_hint(&url);
        let suffix = extension.as_deref().map(|ext| format!(".{ext}")).unwrap_or_default();

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| fail(FetchCause::Io(e)))?;

        let (file, temp) = tempfile::Builder::new()
            .prefix("resonance-")
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)
            .map_err(|e| fail(FetchCause::Io(e)))?
            .into_parts();

        let artifact = AudioArtifact::owned(reference, temp, extension, content_type);
        let mut file = tokio::fs::File::from_std(file);
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(|e| fail(transport_cause(&e)))? {
            written += chunk.len() as u64;

            if written > limit {
                return Err(fail(FetchCause::TooLarge { limit }));
            }

            file.write_all(&chunk).await.map_err(|e| fail(FetchCause::Io(e)))?;
        }

        file.flush().await.map_err(|e| fail(FetchCause::Io(e)))?;

        tracing::debug!(path = %artifact.path().display(), bytes = written, "audio downloaded");

        Ok(artifact)
    }
}

fn transport_cause(error: &reqwest::Error) -> FetchCause {
    if error.is_timeout() {
        FetchCause::Timeout
    } else {
        FetchCause::Connection(error.to_string())
    }
}

async fn existing_file(path: &Path) -> Option<PathBuf> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Some(path.to_path_buf()),
        _ => None,
    }
}

/// Percent-decode a URL path into a relative path that cannot escape its root
fn decode_relative(encoded: &str) -> Option<PathBuf> {
    let url = Url::parse("file:///").ok()?.join(encoded.trim_start_matches('/')).ok()?;
    let absolute = url.to_file_path().ok()?;
    let relative = absolute.strip_prefix("/").ok()?;

    (!relative.as_os_str().is_empty()).then(|| relative.to_path_buf())
}

/// The decoded `d` parameter of a local-files query string
fn local_files_target(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "d")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// File extension of a download, preferring a local-files `d` target
fn extension_hint(url: &Url) -> Option<String> {
    url.query()
        .and_then(local_files_target)
        .and_then(|target| extension_of(Path::new(&target)))
        .or_else(|| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .and_then(|name| extension_of(Path::new(name)))
        })
}

fn sniff(bytes: &[u8]) -> Option<AudioFormat> {
    match bytes {
        [b'I', b'D', b'3', ..] => Some(AudioFormat::Mp3),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(AudioFormat::Wav),
        [b'f', b'L', b'a', b'C', ..] => Some(AudioFormat::Flac),
        [b'O', b'g', b'g', b'S', ..] => Some(AudioFormat::Ogg),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some(AudioFormat::M4a),
        // ADTS header
        [0xFF, second, ..] if second & 0xF6 == 0xF0 => Some(AudioFormat::Aac),
        // MPEG frame sync
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(AudioFormat::Mp3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP3: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00audio";

    fn resolver(configure: impl FnOnce(&mut PlatformConfig)) -> AudioResolver {
        let mut config = PlatformConfig::default();
        configure(&mut config);
        AudioResolver::new(Client::new(), &config)
    }

    #[tokio::test]
    async fn existing_local_file_is_borrowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, MP3).unwrap();

        let artifact = resolver(|_| {}).resolve(path.to_str().unwrap()).await.unwrap();
        assert!(!artifact.is_owned());
        assert_eq!(artifact.path(), path);

        drop(artifact);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn file_url_is_a_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two words.wav");
        std::fs::write(&path, b"RIFF\0\0\0\0WAVEfmt ").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let artifact = resolver(|_| {}).resolve(url.as_str()).await.unwrap();
        assert_eq!(artifact.path(), path);
    }

    #[tokio::test]
    async fn missing_file_url_is_not_found() {
        let err = resolver(|_| {}).resolve("file:///nonexistent/clip.mp3").await.err().unwrap();
        assert!(matches!(err.cause, FetchCause::NotFound(_)));
    }

    #[tokio::test]
    async fn blob_reference_is_rejected() {
        let err = resolver(|_| {}).resolve("blob:http://localhost:8080/1234").await.err().unwrap();
        assert!(matches!(err.cause, FetchCause::BlobReference));
    }

    #[tokio::test]
    async fn upload_path_maps_into_media_root() {
        let media = tempfile::tempdir().unwrap();
        let project = media.path().join("upload").join("3");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("my clip.mp3"), MP3).unwrap();

        let resolver = resolver(|c| c.media_root = Some(media.path().to_path_buf()));

        let artifact = resolver.resolve("/data/upload/3/my%20clip.mp3").await.unwrap();
        assert_eq!(artifact.path(), project.join("my clip.mp3"));

        // same file through an absolute platform URL
        let artifact = resolver
            .resolve("http://localhost:8080/data/upload/3/my%20clip.mp3")
            .await
            .unwrap();
        assert!(!artifact.is_owned());
    }

    #[tokio::test]
    async fn local_files_query_resolves_against_roots() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("calls")).unwrap();
        std::fs::write(root.path().join("calls/a.ogg"), b"OggS").unwrap();

        let resolver = resolver(|c| c.local_roots = vec![root.path().to_path_buf()]);
        let artifact = resolver.resolve("/data/local-files/?d=calls%2Fa.ogg").await.unwrap();

        assert_eq!(artifact.path(), root.path().join("calls/a.ogg"));
    }

    #[tokio::test]
    async fn relative_reference_searches_roots_by_name() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("test.mp3"), MP3).unwrap();

        let resolver = resolver(|c| c.local_roots = vec![root.path().to_path_buf()]);
        let artifact = resolver.resolve("nested/dir/test.mp3").await.unwrap();

        assert_eq!(artifact.path(), root.path().join("test.mp3"));
    }

    #[test]
    fn traversal_cannot_escape_root() {
        assert_eq!(decode_relative("../../etc/passwd"), Some(PathBuf::from("etc/passwd")));
        assert_eq!(decode_relative("/a/%2E%2E/b.mp3"), Some(PathBuf::from("b.mp3")));
        assert_eq!(decode_relative("/"), None);
    }

    #[test]
    fn owned_artifact_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let temp = tempfile::NamedTempFile::new_in(dir.path()).unwrap().into_temp_path();
        let path = temp.to_path_buf();

        let artifact = AudioArtifact::owned("x", temp, None, None);
        assert!(artifact.is_owned());
        assert!(path.exists());

        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn format_detection_order() {
        let all = AudioFormat::all();
        let artifact = |ext: Option<&str>, mime: Option<&str>| AudioArtifact {
            reference: "x".to_owned(),
            path: PathBuf::from("/nonexistent"),
            temp: None,
            extension: ext.map(str::to_owned),
            content_type: mime.map(str::to_owned),
        };

        assert_eq!(artifact(Some("flac"), None).format(b"data", &all).unwrap(), AudioFormat::Flac);
        assert_eq!(artifact(None, Some("audio/ogg")).format(b"data", &all).unwrap(), AudioFormat::Ogg);
        assert_eq!(artifact(Some("bin"), None).format(MP3, &all).unwrap(), AudioFormat::Mp3);
        assert_eq!(artifact(None, None).format(&[0xFF, 0xF1, 0x50], &all).unwrap(), AudioFormat::Aac);

        assert!(matches!(artifact(Some("mp3"), None).format(b"", &all), Err(UnsupportedAudio::Empty)));
        assert!(matches!(
            artifact(Some("txt"), Some("text/plain")).format(b"hello", &all),
            Err(UnsupportedAudio::Unrecognized)
        ));
        assert!(matches!(
            artifact(Some("wav"), None).format(b"RIFF", &[AudioFormat::Mp3]),
            Err(UnsupportedAudio::Disabled("wav"))
        ));
    }

    #[test]
    fn extension_hint_prefers_local_files_target() {
        let url = Url::parse("http://ls/data/local-files/?d=a%2Fb.m4a").unwrap();
        assert_eq!(extension_hint(&url).as_deref(), Some("m4a"));

        let url = Url::parse("http://ls/data/upload/1/Clip.MP3").unwrap();
        assert_eq!(extension_hint(&url).as_deref(), Some("mp3"));
    }
}
