//! Verification orchestrator tests: pixel stage, judge dispatch, fallback.

mod support;

use std::sync::Arc;

use support::*;
use vrt_core::vlm_judge::{GeminiProvider, ProviderKind, ProviderRegistry, VlmConfig};
use vrt_core::{
    decode_image, CompareError, ImageCompareInput, ImageStore, MemoryImageStore, TestStatus,
    VlmVerifier,
};

/// 20x20 white baseline and a candidate with a 10px black line: 2.5% changed.
fn store_with_pair() -> Arc<MemoryImageStore> {
    let base = solid(20, 20, WHITE);
    let changed = with_rect(&base, 5, 5, 10, 1, BLACK);
    Arc::new(
        MemoryImageStore::new()
            .with_image("baseline.png", base)
            .with_image("image.png", changed),
    )
}

fn input() -> ImageCompareInput {
    ImageCompareInput::new(Some("baseline.png"), "image.png")
}

fn verifier(store: &Arc<MemoryImageStore>, provider: &Arc<ScriptedProvider>) -> VlmVerifier {
    VlmVerifier::new(store.clone(), provider.registry())
}

#[tokio::test]
async fn test_no_baseline_is_new_for_any_config() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(true, "same");
    let verifier = verifier(&store, &provider);
    let input = ImageCompareInput::new(None, "image.png");

    for config in [
        VlmConfig::default(),
        VlmConfig::gemini("gemini-1.5-pro", "key"),
        VlmConfig::default().with_thinking(true),
    ] {
        let result = verifier.get_diff(&input, &config).await.unwrap();
        assert_eq!(result.status, TestStatus::New);
        assert_eq!(result.pixel_mis_match_count, 0);
        assert_eq!(result.diff_percent, 0.0);
        assert!(result.diff_name.is_none());
        assert!(result.vlm_description.is_none());
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_within_tolerance_skips_judge() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(false, "different");
    let verifier = verifier(&store, &provider);

    let result = verifier
        .get_diff(&input().with_tolerance(2.5), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Ok);
    assert_eq!(result.diff_percent, 2.5);
    assert!(result.vlm_description.is_none());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_identical_verdict_overrides_to_ok() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(true, "Only minor antialiasing differences");
    let verifier = verifier(&store, &provider);

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Ok);
    assert_eq!(
        result.vlm_description.as_deref(),
        Some("Only minor antialiasing differences")
    );
    assert_eq!(result.pixel_mis_match_count, 10);
    assert_eq!(result.diff_percent, 2.5);
    assert!(result.is_same_dimension);
    assert!(result.diff_name.is_some());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_different_verdict_stays_unresolved() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(false, "A line was added under the header");
    let verifier = verifier(&store, &provider);

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Unresolved);
    assert_eq!(
        result.vlm_description.as_deref(),
        Some("A line was added under the header")
    );
    assert_eq!(result.pixel_mis_match_count, 10);
}

#[tokio::test]
async fn test_provider_error_degrades_to_pixel_result() {
    let store = store_with_pair();
    let provider = ScriptedProvider::failing("Connection refused");
    let verifier = verifier(&store, &provider);

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Unresolved);
    let description = result.vlm_description.unwrap();
    assert!(description.contains("VLM analysis failed"));
    assert!(description.contains("Connection refused"));
    assert_eq!(result.pixel_mis_match_count, 10);
}

#[tokio::test]
async fn test_missing_diff_image_returns_pixel_result_unannotated() {
    let store = store_with_pair();
    store.set_fail_saves(true);
    let provider = ScriptedProvider::verdict(true, "same");
    let verifier = verifier(&store, &provider);

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Unresolved);
    assert!(result.diff_name.is_none());
    assert!(result.vlm_description.is_none());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_stub_result_with_unknown_diff_is_unchanged() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(true, "same");
    let pixel = StubComparator::new(unresolved_result(Some("gone.png")));
    let verifier = verifier(&store, &provider).with_pixel_comparator(pixel.clone());

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result, unresolved_result(Some("gone.png")));
    assert_eq!(provider.calls(), 0);
    assert_eq!(store.fetches(), vec!["baseline.png", "image.png", "gone.png"]);
}

#[tokio::test]
async fn test_pixel_stage_always_saves_diff() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(true, "same");
    let pixel = StubComparator::new(vrt_core::DiffResult::equal());
    let verifier = verifier(&store, &provider).with_pixel_comparator(pixel.clone());

    let result = verifier
        .get_diff(&input().with_saved_diff(false), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Ok);
    let seen = pixel.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].save_diff_as_file);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_judge_receives_baseline_candidate_diff_in_order() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(true, "same");
    let verifier = verifier(&store, &provider);

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    let calls = provider.images();
    assert_eq!(calls.len(), 1);
    let images = &calls[0];
    assert_eq!(images.len(), 3);

    let diff_name = result.diff_name.unwrap();
    let expected = ["baseline.png", "image.png", diff_name.as_str()];
    for (bytes, name) in images.iter().zip(expected) {
        let stored = store.get_image(name).await.unwrap().unwrap();
        assert_eq!(decode_image(bytes).unwrap(), stored, "{name}");
    }
}

#[tokio::test]
async fn test_missing_candidate_is_hard_error() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(true, "same");
    let verifier = verifier(&store, &provider);

    let err = verifier
        .get_diff(
            &ImageCompareInput::new(Some("baseline.png"), "nope.png"),
            &VlmConfig::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CompareError::ImageNotFound(name) if name == "nope.png"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_baseline_missing_from_store_is_new() {
    let store = store_with_pair();
    store.remove("baseline.png");
    let provider = ScriptedProvider::verdict(true, "same");
    let verifier = verifier(&store, &provider);

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::New);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_malformed_answers_degrade() {
    let cases = [
        ("not json at all", "not valid JSON"),
        (r#"{"identical":"yes","description":"x"}"#, "verdict schema"),
        (r#"{"description":"no flag"}"#, "verdict schema"),
        (r#"[true, "x"]"#, "verdict schema"),
    ];
    for (answer, expected) in cases {
        let store = store_with_pair();
        let provider = ScriptedProvider::answering(answer);
        let result = verifier(&store, &provider)
            .get_diff(&input(), &VlmConfig::default())
            .await
            .unwrap();

        assert_eq!(result.status, TestStatus::Unresolved, "{answer}");
        let description = result.vlm_description.unwrap();
        assert!(description.starts_with("VLM analysis failed: "), "{description}");
        assert!(description.contains(expected), "{description}");
    }
}

#[tokio::test]
async fn test_empty_answer_degrades() {
    let store = store_with_pair();
    let provider = ScriptedProvider::new(Reply::Text {
        content: Some("  ".to_string()),
        thinking: None,
    });

    let result = verifier(&store, &provider)
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(
        result.vlm_description.as_deref(),
        Some("VLM analysis failed: Empty response from model")
    );
}

#[tokio::test]
async fn test_thinking_preference() {
    let reply = Reply::Text {
        content: Some(r#"{"identical":false,"description":"from content"}"#.to_string()),
        thinking: Some(r#"{"identical":true,"description":"from thinking"}"#.to_string()),
    };

    let store = store_with_pair();
    let provider = ScriptedProvider::new(reply.clone());
    let result = verifier(&store, &provider)
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();
    assert_eq!(result.status, TestStatus::Unresolved);
    assert_eq!(result.vlm_description.as_deref(), Some("from content"));

    let store = store_with_pair();
    let provider = ScriptedProvider::new(reply);
    let result = verifier(&store, &provider)
        .get_diff(&input(), &VlmConfig::default().with_thinking(true))
        .await
        .unwrap();
    assert_eq!(result.status, TestStatus::Ok);
    assert_eq!(result.vlm_description.as_deref(), Some("from thinking"));
}

#[tokio::test]
async fn test_thinking_only_answer_is_used_as_fallback() {
    let store = store_with_pair();
    let provider = ScriptedProvider::new(Reply::Text {
        content: None,
        thinking: Some(r#"{"identical":true,"description":""}"#.to_string()),
    });

    let result = verifier(&store, &provider)
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Ok);
    assert_eq!(
        result.vlm_description.as_deref(),
        Some("No description provided")
    );
}

#[tokio::test]
async fn test_config_reaches_provider_unchanged() {
    let store = store_with_pair();
    let provider = ScriptedProvider::verdict(true, "same");
    let config = VlmVerifier::parse_config(
        r#"{"provider":"cloud","model":"gemini-1.5-flash","temperature":0.4,"apiKey":"k"}"#,
    );

    verifier(&store, &provider)
        .get_diff(&input(), &config)
        .await
        .unwrap();

    let seen = provider.configs();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].provider, ProviderKind::Gemini);
    assert_eq!(seen[0].model, "gemini-1.5-flash");
    assert_eq!(seen[0].api_key.as_deref(), Some("k"));
}

#[tokio::test]
async fn test_cloud_config_without_key_degrades() {
    let store = store_with_pair();
    let registry = ProviderRegistry::new().with_provider(
        ProviderKind::Gemini,
        Arc::new(GeminiProvider::with_base_url("http://127.0.0.1:9")),
    );
    let verifier = VlmVerifier::new(store.clone(), registry);
    let config = VlmVerifier::parse_config(r#"{"provider":"gemini","model":"gemini-1.5-pro"}"#);

    let result = verifier.get_diff(&input(), &config).await.unwrap();

    assert_eq!(result.status, TestStatus::Unresolved);
    assert_eq!(
        result.vlm_description.as_deref(),
        Some("VLM analysis failed: Gemini API key is required")
    );
}

#[tokio::test]
async fn test_unregistered_provider_degrades() {
    let store = store_with_pair();
    let verifier = VlmVerifier::new(store.clone(), ProviderRegistry::new());

    let result = verifier
        .get_diff(&input(), &VlmConfig::default())
        .await
        .unwrap();

    assert_eq!(result.status, TestStatus::Unresolved);
    assert!(result
        .vlm_description
        .unwrap()
        .contains("no VLM provider registered for ollama"));
}
