use crate::models::{GenerationPhase, QrArtifact, Settings};
use crate::services::codec::{load_image, CodecError, EcLevel, LoadedImage, QrDecoder, QrEncoder};
use crate::state::StateManager;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Suggested file name for a downloaded QR image
pub const QRCODE_FILENAME: &str = "qrcode.png";

/// Inline message after every verification attempt mismatched
pub const VERIFICATION_FAILED_TEXT: &str = "二维码生成验证失败，请重试";

/// Inline message after an encoder/decoder/image error
pub const GENERATION_ERROR_TEXT: &str = "生成二维码时出错";

/// Tunables for the generation flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Fresh encodes allowed after the first one fails verification.
    /// The flow performs at most `max_attempts + 1` encodes.
    pub max_attempts: u32,
    pub module_scale: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for GenerationSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_retries,
            module_scale: settings.module_scale,
        }
    }
}

/// Reasons a generation is refused before it starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Input text is empty")]
    EmptyInput,

    #[error("A generation is already in progress")]
    AlreadyRunning,
}

/// How a started generation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The decoded image matched the input; the artifact is live
    Verified { attempts: u32 },

    /// Every attempt decoded to something else (or nothing)
    VerificationFailed { attempts: u32 },

    /// A collaborator failed; no retry was spent on it
    Errored { attempts: u32, error: CodecError },
}

/// Verify-and-retry QR generation.
///
/// Each attempt encodes the text, waits for the rendered PNG to load, decodes it and
/// compares the result byte for byte with the input. Mismatches retry with a fresh
/// encode up to `max_attempts` times; collaborator errors stop immediately.
pub struct GenerationService<E, D> {
    encoder: E,
    decoder: Arc<D>,
    settings: GenerationSettings,
}

impl<E: QrEncoder, D: QrDecoder> GenerationService<E, D> {
    pub fn new(encoder: E, decoder: Arc<D>, settings: GenerationSettings) -> Self {
        Self {
            encoder,
            decoder,
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Run the flow for the text currently in the input box.
    ///
    /// Returns `Err` only for refusals (empty input, already running); every started
    /// generation reports through [`GenerationOutcome`] and the session state.
    pub async fn generate(
        &self,
        input: &str,
        state: &StateManager,
    ) -> Result<GenerationOutcome, GenerationError> {
        state.log("用户点击了生成按钮");
        state.log("开始生成二维码...");

        let text = input.trim();
        if text.is_empty() {
            state.log("获取输入框文本，失败：输入框为空");
            return Err(GenerationError::EmptyInput);
        }

        if !state.try_begin_generation() {
            state.log("生成进行中，忽略重复点击");
            return Err(GenerationError::AlreadyRunning);
        }
        state.log("获取输入框文本，成功");

        let started = Instant::now();
        let max_attempts = self.settings.max_attempts;
        let mut attempt = 0;

        loop {
            state.set_generation_phase(GenerationPhase::Encoding, attempt);
            tracing::debug!("Generation attempt {} of {}", attempt + 1, max_attempts + 1);

            let (png, image) = match self.render(text, state).await {
                Ok(rendered) => rendered,
                Err(error) => return Ok(Self::fail_hard(state, attempt + 1, error)),
            };
            state.log("生成二维码，成功");

            state.set_generation_phase(GenerationPhase::Verifying, attempt);
            let decoded = match self.decoder.decode(&image.luma, image.width, image.height) {
                Ok(decoded) => decoded,
                Err(error) => return Ok(Self::fail_hard(state, attempt + 1, error)),
            };

            if decoded.as_deref() == Some(text) {
                state.log("自动解析验证成功");
                state.finish_generation_success(QrArtifact {
                    text: text.to_string(),
                    png: Arc::from(png),
                    width: image.width,
                    height: image.height,
                    luma: Arc::from(image.luma),
                });
                state.metrics().record_generation_verified(started.elapsed());
                tracing::info!("QR code verified after {} attempt(s)", attempt + 1);
                return Ok(GenerationOutcome::Verified {
                    attempts: attempt + 1,
                });
            }

            tracing::warn!(
                "Round-trip mismatch on attempt {}: decoded {:?}",
                attempt + 1,
                decoded
            );

            if attempt < max_attempts {
                state.log("自动验证失败，准备重试...");
                state.set_generation_phase(GenerationPhase::Retrying, attempt);
                attempt += 1;
                continue;
            }

            state.log("自动验证失败，已达最大重试次数");
            state.finish_generation_failure(VERIFICATION_FAILED_TEXT);
            state.metrics().record_generation_failed();
            return Ok(GenerationOutcome::VerificationFailed {
                attempts: attempt + 1,
            });
        }
    }

    /// Encode and wait for the rendered image to load.
    async fn render(
        &self,
        text: &str,
        state: &StateManager,
    ) -> Result<(Vec<u8>, LoadedImage), CodecError> {
        state.metrics().record_encode_attempt();
        let png = self.encoder.encode(text, EcLevel::H)?;
        let image = load_image(png.clone()).await?;
        Ok((png, image))
    }

    fn fail_hard(state: &StateManager, attempts: u32, error: CodecError) -> GenerationOutcome {
        tracing::error!("Generation failed: {}", error);
        state.log(format!("生成失败：{}", error));
        state.finish_generation_failure(GENERATION_ERROR_TEXT);
        state.metrics().record_generation_failed();
        GenerationOutcome::Errored { attempts, error }
    }
}
