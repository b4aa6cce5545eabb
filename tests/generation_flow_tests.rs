//! Integration tests for the verify-and-retry generation flow
//!
//! These tests verify:
//! - A verified artifact exists only when decoding the render gives back the input
//! - The retry loop is bounded by the configured cap
//! - Encoder/decoder errors fail immediately without spending a retry
//! - A generation cannot start while another is in flight

use mockall::mock;
use proptest::prelude::*;
use qrlens::services::{
    CodecError, EcLevel, GenerationError, GenerationOutcome, GenerationService,
    GenerationSettings, QrCodeEncoder, QrDecoder, QrEncoder, RqrrDecoder,
};
use qrlens::{GenerationPhase, StateChange, StateManager};
use std::sync::Arc;

mock! {
    pub Encoder {}

    impl QrEncoder for Encoder {
        fn encode(&self, text: &str, level: EcLevel) -> Result<Vec<u8>, CodecError>;
    }
}

mock! {
    pub Decoder {}

    impl QrDecoder for Decoder {
        fn decode(&self, luma: &[u8], width: u32, height: u32) -> Result<Option<String>, CodecError>;
    }
}

fn settings(max_attempts: u32) -> GenerationSettings {
    GenerationSettings {
        max_attempts,
        module_scale: 4,
    }
}

fn real_service(max_attempts: u32) -> GenerationService<QrCodeEncoder, RqrrDecoder> {
    GenerationService::new(
        QrCodeEncoder::new(4),
        Arc::new(RqrrDecoder::new()),
        settings(max_attempts),
    )
}

/// Encoder that renders real PNGs so image loading succeeds, counting calls
fn counting_encoder(expected_calls: usize) -> MockEncoder {
    let mut encoder = MockEncoder::new();
    encoder
        .expect_encode()
        .times(expected_calls)
        .returning(|text, level| QrCodeEncoder::new(2).encode(text, level));
    encoder
}

fn messages(state: &StateManager) -> Vec<String> {
    state
        .debug_log()
        .entries()
        .into_iter()
        .map(|entry| entry.message)
        .collect()
}

#[tokio::test]
async fn test_hello_scenario_log_order() {
    let state = StateManager::new();

    let outcome = real_service(3).generate("hello", &state).await.unwrap();

    assert_eq!(outcome, GenerationOutcome::Verified { attempts: 1 });
    assert!(state.read(|s| s.download_visible()));
    assert_eq!(
        messages(&state),
        vec![
            "用户点击了生成按钮",
            "开始生成二维码...",
            "获取输入框文本，成功",
            "生成二维码，成功",
            "自动解析验证成功",
        ]
    );
}

#[tokio::test]
async fn test_artifact_png_decodes_to_input() {
    let state = StateManager::new();
    let text = "https://example.com/?q=二维码&n=42";

    real_service(0).generate(text, &state).await.unwrap();

    let png = state
        .read(|s| s.artifact.as_ref().map(|a| a.png.clone()))
        .expect("artifact should be stored");
    let image = qrlens::services::LoadedImage::from_bytes(&png).unwrap();
    let decoded = RqrrDecoder::new()
        .decode(&image.luma, image.width, image.height)
        .unwrap();
    assert_eq!(decoded.as_deref(), Some(text));
}

#[tokio::test]
async fn test_success_emits_phase_and_artifact_events() {
    let state = StateManager::new();
    let mut rx = state.subscribe();

    real_service(3).generate("events", &state).await.unwrap();

    let mut phases = Vec::new();
    let mut artifact_present = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            StateChange::GenerationPhaseChanged { phase, .. } => phases.push(phase),
            StateChange::ArtifactChanged { present } => artifact_present = present,
            _ => {}
        }
    }

    assert_eq!(
        phases,
        vec![
            GenerationPhase::Encoding,
            GenerationPhase::Verifying,
            GenerationPhase::Success,
        ]
    );
    assert!(artifact_present);
}

#[tokio::test]
async fn test_all_mismatches_exhaust_retries() {
    let state = StateManager::new();
    let mut decoder = MockDecoder::new();
    decoder
        .expect_decode()
        .times(4)
        .returning(|_, _, _| Ok(Some("something else".to_string())));
    let service = GenerationService::new(counting_encoder(4), Arc::new(decoder), settings(3));

    let outcome = service.generate("hello", &state).await.unwrap();

    assert_eq!(outcome, GenerationOutcome::VerificationFailed { attempts: 4 });
    assert_eq!(state.read(|s| s.generation_phase), GenerationPhase::Failed);
    assert!(!state.read(|s| s.download_visible()));

    let log = messages(&state);
    let retries = log.iter().filter(|m| *m == "自动验证失败，准备重试...").count();
    assert_eq!(retries, 3);
    assert_eq!(log.last().map(String::as_str), Some("自动验证失败，已达最大重试次数"));
}

#[tokio::test]
async fn test_decoder_error_is_not_retried() {
    let state = StateManager::new();
    let mut decoder = MockDecoder::new();
    decoder.expect_decode().times(1).returning(|_, _, _| {
        Err(CodecError::PixelBuffer {
            expected: 1,
            actual: 0,
        })
    });
    let service = GenerationService::new(counting_encoder(1), Arc::new(decoder), settings(5));

    let outcome = service.generate("hello", &state).await.unwrap();

    assert!(matches!(outcome, GenerationOutcome::Errored { attempts: 1, .. }));
    assert_eq!(
        state.read(|s| s.generation_error.clone()).as_deref(),
        Some("生成二维码时出错")
    );
}

#[tokio::test]
async fn test_rejects_generation_while_running() {
    let state = StateManager::new();
    assert!(state.try_begin_generation());

    let mut encoder = MockEncoder::new();
    encoder.expect_encode().never();
    let service = GenerationService::new(encoder, Arc::new(MockDecoder::new()), settings(3));

    let err = service.generate("hello", &state).await.unwrap_err();

    assert_eq!(err, GenerationError::AlreadyRunning);
    assert!(state.debug_log().contains("生成进行中，忽略重复点击"));
    assert_eq!(state.read(|s| s.generation_phase), GenerationPhase::Encoding);
}

#[tokio::test]
async fn test_can_generate_again_after_failure() {
    let state = StateManager::new();
    let mut encoder = MockEncoder::new();
    encoder
        .expect_encode()
        .times(1)
        .returning(|_, _| Err(CodecError::Encode("too long".to_string())));
    let failing = GenerationService::new(encoder, Arc::new(MockDecoder::new()), settings(3));
    failing.generate("hello", &state).await.unwrap();

    let outcome = real_service(3).generate("hello", &state).await.unwrap();

    assert_eq!(outcome, GenerationOutcome::Verified { attempts: 1 });
    assert!(state.read(|s| s.generation_error.is_none()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_encode_calls_bounded_by_cap(max_attempts in 0u32..6) {
        let state = StateManager::new();
        let encoder = counting_encoder(max_attempts as usize + 1);
        let mut decoder = MockDecoder::new();
        decoder.expect_decode().returning(|_, _, _| Ok(None));
        let service = GenerationService::new(encoder, Arc::new(decoder), settings(max_attempts));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let outcome = rt.block_on(service.generate("bounded", &state)).unwrap();

        prop_assert_eq!(
            outcome,
            GenerationOutcome::VerificationFailed { attempts: max_attempts + 1 }
        );
        prop_assert_eq!(state.metrics().encode_attempts.load(std::sync::atomic::Ordering::Relaxed), u64::from(max_attempts) + 1);
    }
}
