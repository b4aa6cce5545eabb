use crate::services::codec::{load_image, QrDecoder};
use crate::state::StateManager;
use camino::Utf8Path;
use std::sync::Arc;
use thiserror::Error;

/// File extensions offered by the open dialog
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Reasons a parse is refused before any work happens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No image file selected")]
    NoFileSelected,
}

/// Result of decoding a user-supplied image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Decoded(String),
    FileReadFailed(String),
    ImageDecodeFailed(String),
    /// The image loaded but contained no decodable symbol
    SymbolNotFound,
    /// The decoder itself rejected the pixel buffer
    DecoderFailed(String),
}

impl ParseOutcome {
    /// Text shown in the parse result area
    pub fn display_text(&self) -> String {
        match self {
            ParseOutcome::Decoded(text) => format!("解析结果：{}", text),
            ParseOutcome::FileReadFailed(_) => "文件读取失败".to_string(),
            ParseOutcome::ImageDecodeFailed(_) => "图片加载失败".to_string(),
            ParseOutcome::SymbolNotFound => "无法解析二维码".to_string(),
            ParseOutcome::DecoderFailed(_) => "解析二维码时出错".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Decoded(_))
    }
}

/// Single-shot QR decoding of an image file.
///
/// There is no retry: a user-supplied image that fails once will fail again.
pub struct ParseService<D> {
    decoder: Arc<D>,
}

impl<D: QrDecoder> ParseService<D> {
    pub fn new(decoder: Arc<D>) -> Self {
        Self { decoder }
    }

    /// Read, decode and report the selected file.
    ///
    /// Returns `Err` only when nothing is selected. Every other result is written to the
    /// session state's parse result and returned as a [`ParseOutcome`].
    pub async fn parse(
        &self,
        file: Option<&Utf8Path>,
        state: &StateManager,
    ) -> Result<ParseOutcome, ParseError> {
        state.log("用户点击了解析二维码按钮");
        state.log("开始解析二维码...");
        state.set_parse_result("");

        let Some(path) = file else {
            state.log("上传文件，失败：未选择文件");
            return Err(ParseError::NoFileSelected);
        };
        state.log("上传文件，成功");

        state.set_parsing(true);
        let outcome = self.run(path, state).await;
        state.set_parsing(false);

        state.metrics().record_parse(outcome.is_success());
        state.set_parse_result(outcome.display_text());
        tracing::info!("Parse of {} finished: {:?}", path, outcome);

        Ok(outcome)
    }

    async fn run(&self, path: &Utf8Path, state: &StateManager) -> ParseOutcome {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path, e);
                state.log("读取文件失败");
                return ParseOutcome::FileReadFailed(e.to_string());
            }
        };
        state.log("读取文件，成功");

        let image = match load_image(bytes).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Failed to decode image {}: {}", path, e);
                state.log("加载图片失败");
                return ParseOutcome::ImageDecodeFailed(e.to_string());
            }
        };
        state.log("加载图片，成功");

        match self.decoder.decode(&image.luma, image.width, image.height) {
            Ok(Some(text)) => {
                state.log("解析二维码，成功");
                ParseOutcome::Decoded(text)
            }
            Ok(None) => {
                state.log("解析二维码，失败");
                ParseOutcome::SymbolNotFound
            }
            Err(e) => {
                state.log(format!("解析二维码时出错：{}", e));
                ParseOutcome::DecoderFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::codec::{
        CodecError, EcLevel, MockQrDecoder, QrCodeEncoder, QrEncoder, RqrrDecoder,
    };
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> Utf8PathBuf {
        let path = Utf8PathBuf::try_from(dir.path().join(name)).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_no_file_selected() {
        let state = StateManager::new();
        let mut decoder = MockQrDecoder::new();
        decoder.expect_decode().never();
        let service = ParseService::new(Arc::new(decoder));

        let err = service.parse(None, &state).await.unwrap_err();

        assert_eq!(err, ParseError::NoFileSelected);
        assert!(state.read(|s| s.parse_result.is_empty()));
        assert!(state.debug_log().contains("上传文件，失败：未选择文件"));
    }

    #[tokio::test]
    async fn test_decodes_generated_png() {
        let dir = TempDir::new().unwrap();
        let png = QrCodeEncoder::new(6).encode("parse me", EcLevel::H).unwrap();
        let path = write_file(&dir, "code.png", &png);

        let state = StateManager::new();
        let service = ParseService::new(Arc::new(RqrrDecoder::new()));
        let outcome = service.parse(Some(path.as_path()), &state).await.unwrap();

        assert_eq!(outcome, ParseOutcome::Decoded("parse me".to_string()));
        assert_eq!(state.read(|s| s.parse_result.clone()), "解析结果：parse me");
        assert!(state.debug_log().contains("解析二维码，成功"));
        assert!(!state.read(|s| s.is_parsing));
    }

    #[tokio::test]
    async fn test_missing_file_is_read_failure() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("gone.png")).unwrap();

        let state = StateManager::new();
        let mut decoder = MockQrDecoder::new();
        decoder.expect_decode().never();
        let service = ParseService::new(Arc::new(decoder));

        let outcome = service.parse(Some(path.as_path()), &state).await.unwrap();

        assert!(matches!(outcome, ParseOutcome::FileReadFailed(_)));
        assert_eq!(state.read(|s| s.parse_result.clone()), "文件读取失败");
        assert!(state.debug_log().contains("读取文件失败"));
    }

    #[tokio::test]
    async fn test_non_image_is_decode_failure() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.png", b"just some text");

        let state = StateManager::new();
        let mut decoder = MockQrDecoder::new();
        decoder.expect_decode().never();
        let service = ParseService::new(Arc::new(decoder));

        let outcome = service.parse(Some(path.as_path()), &state).await.unwrap();

        assert!(matches!(outcome, ParseOutcome::ImageDecodeFailed(_)));
        assert_eq!(state.read(|s| s.parse_result.clone()), "图片加载失败");
    }

    #[tokio::test]
    async fn test_symbol_not_found_decodes_once() {
        let dir = TempDir::new().unwrap();
        let png = QrCodeEncoder::new(2).encode("x", EcLevel::H).unwrap();
        let path = write_file(&dir, "blank.png", &png);

        let state = StateManager::new();
        let mut decoder = MockQrDecoder::new();
        decoder.expect_decode().times(1).returning(|_, _, _| Ok(None));
        let service = ParseService::new(Arc::new(decoder));

        let outcome = service.parse(Some(path.as_path()), &state).await.unwrap();

        assert_eq!(outcome, ParseOutcome::SymbolNotFound);
        assert_eq!(state.read(|s| s.parse_result.clone()), "无法解析二维码");
    }

    #[tokio::test]
    async fn test_decoder_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let png = QrCodeEncoder::new(2).encode("x", EcLevel::H).unwrap();
        let path = write_file(&dir, "code.png", &png);

        let state = StateManager::new();
        let mut decoder = MockQrDecoder::new();
        decoder.expect_decode().times(1).returning(|_, _, _| {
            Err(CodecError::PixelBuffer {
                expected: 4,
                actual: 3,
            })
        });
        let service = ParseService::new(Arc::new(decoder));

        let outcome = service.parse(Some(path.as_path()), &state).await.unwrap();

        assert!(matches!(outcome, ParseOutcome::DecoderFailed(_)));
        assert_eq!(state.read(|s| s.parse_result.clone()), "解析二维码时出错");
    }
}
