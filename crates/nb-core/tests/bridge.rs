use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use nb_core::{Bridge, BridgeConfig, BridgeError, SessionConfig, StopReason, TokenizerAdapter};
use nb_model::fixtures::TinyLlama;
use nb_model::{LoadParams, Model};

fn config() -> BridgeConfig {
    BridgeConfig {
        session: SessionConfig {
            n_ctx: 256,
            n_batch: 32,
            n_threads: 2,
            ..SessionConfig::default()
        },
        ..BridgeConfig::default()
    }
}

fn sky() -> TinyLlama {
    TinyLlama::new()
        .with_name("Tiny Sky")
        .with_sequence(&["s", "▁", "b", "l", "u", "e", "</s>"])
}

fn write(dir: &tempfile::TempDir, name: &str, tiny: &TinyLlama) -> PathBuf {
    let path = dir.path().join(name);
    tiny.write_to(&path).unwrap();
    path
}

#[test]
fn test_generate_before_load_is_not_loaded() {
    let bridge = Bridge::new(config());
    assert!(bridge.initialize());
    assert!(!bridge.is_loaded());
    assert!(matches!(bridge.generate("hello", 10), Err(BridgeError::NotLoaded)));
    assert_eq!(bridge.model_info_text(), "no model loaded");
}

#[test]
fn test_missing_model_then_generate() {
    let bridge = Bridge::new(config());
    assert!(bridge.load_model("missing.gguf").is_err());
    assert!(!bridge.is_loaded());
    assert!(matches!(bridge.generate("hello", 10), Err(BridgeError::NotLoaded)));
}

#[test]
fn test_sky_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let bridge = Bridge::new(config());

    let handle = bridge.load_model(&path).unwrap();
    assert!(handle.get() != 0);
    assert!(bridge.is_loaded());

    let result = bridge.generate("The sky is", 5).unwrap();
    assert_eq!(result.text, " blue");
    assert_eq!(result.tokens_generated, 5);
    assert_eq!(result.stop_reason, StopReason::MaxTokens);

    let result = bridge.generate("The sky is", 20).unwrap();
    assert_eq!(result.text, " blue");
    assert_eq!(result.stop_reason, StopReason::EndOfSequence);
}

#[test]
fn test_cleanup_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let bridge = Bridge::new(config());
    bridge.load_model(&path).unwrap();

    assert!(bridge.model_info_text().starts_with("GGUF Model\nName: Tiny Sky"));
    bridge.cleanup();
    bridge.cleanup();
    assert!(!bridge.is_loaded());
    assert!(bridge.model_info().is_none());
    assert_eq!(bridge.model_info_text(), "no model loaded");
    assert!(matches!(bridge.generate("The sky is", 5), Err(BridgeError::NotLoaded)));
}

#[test]
fn test_determinism() {
    let dir = tempfile::tempdir().unwrap();
    let tiny = TinyLlama::new().with_sequence(&["o", "▁", "a", "b", "c", "a"]);
    let path = write(&dir, "cycle.gguf", &tiny);
    let bridge = Bridge::new(config());
    bridge.load_model(&path).unwrap();

    let first = bridge.generate("hello", 40).unwrap();
    let second = bridge.generate("hello", 40).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.text.len(), 40);
    assert!(first.text.starts_with(" abcabc"));
}

#[test]
fn test_budget_respect() {
    let dir = tempfile::tempdir().unwrap();
    let tiny = TinyLlama::new().with_sequence(&["o", "▁", "a", "b", "a"]);
    let path = write(&dir, "cycle.gguf", &tiny);
    let bridge = Bridge::new(config());
    bridge.load_model(&path).unwrap();

    for n in [0usize, 1, 2, 7, 30] {
        let result = bridge.generate("hello", n).unwrap();
        assert_eq!(result.tokens_generated, n);
        assert_eq!(result.text.len(), n);
        assert_eq!(result.stop_reason, StopReason::MaxTokens);
    }
}

#[test]
fn test_round_trip_ascii() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let model = Model::load(&path, &LoadParams::default()).unwrap();
    let adapter = TokenizerAdapter::new(&model);

    for text in ["The sky is blue.", "a", "x = (1 + 2) * 3; // done", "multiple   spaces"] {
        let tokens = adapter.encode(text);
        assert_eq!(tokens[0], model.tokenizer().bos_id());
        assert!(!tokens.contains(&model.tokenizer().eos_id()));
        assert_eq!(adapter.detokenize(&tokens), text);
    }
    assert!(adapter.encode("").is_empty());
}

#[test]
fn test_concurrent_generate_is_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let tiny = sky()
        .with_transition("o", "k")
        .with_transition("k", "!")
        .with_transition("!", "</s>");
    let path = write(&dir, "multi.gguf", &tiny);
    let bridge = Arc::new(Bridge::new(config()));
    bridge.load_model(&path).unwrap();

    let expected_sky = bridge.generate("The sky is", 16).unwrap();
    let expected_ok = bridge.generate("hello", 16).unwrap();
    assert_eq!(expected_ok.text, "k!");

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                let prompt = if i % 2 == 0 { "The sky is" } else { "hello" };
                (0..10)
                    .map(|_| (prompt, bridge.generate(prompt, 16).unwrap()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for worker in workers {
        for (prompt, result) in worker.join().unwrap() {
            let expected = if prompt == "hello" { &expected_ok } else { &expected_sky };
            assert_eq!(&result, expected);
        }
    }
}

#[test]
fn test_cleanup_races_with_generate() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let bridge = Arc::new(Bridge::new(config()));
    bridge.load_model(&path).unwrap();

    let generator = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || {
            for _ in 0..20 {
                match bridge.generate("The sky is", 8) {
                    Ok(result) => assert_eq!(result.text, " blue"),
                    Err(BridgeError::NotLoaded) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        })
    };
    bridge.cleanup();
    generator.join().unwrap();
    assert!(!bridge.is_loaded());
}

#[test]
fn test_reload_replaces_model_and_bumps_handle() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(&dir, "first.gguf", &sky());
    let second = write(
        &dir,
        "second.gguf",
        &TinyLlama::new().with_name("Second").with_sequence(&["s", "▁", "n", "o", "</s>"]),
    );
    let bridge = Bridge::new(config());

    let h1 = bridge.load_model(&first).unwrap();
    let h2 = bridge.load_model(&second).unwrap();
    assert!(h2 > h1);
    assert_eq!(bridge.model_info().unwrap().name, "Second");
    assert_eq!(bridge.generate("The sky is", 8).unwrap().text, " no");
}

#[test]
fn test_failed_reload_leaves_bridge_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let bridge = Bridge::new(config());
    bridge.load_model(&path).unwrap();

    let junk = dir.path().join("junk.gguf");
    std::fs::write(&junk, b"GGUF but not really").unwrap();
    assert!(matches!(bridge.load_model(&junk), Err(BridgeError::Load(_))));
    assert!(!bridge.is_loaded());
    assert_eq!(bridge.model_info_text(), "no model loaded");
}

#[test]
fn test_oversized_tensor_dims_fail_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(&dir, "sky.gguf", &sky());
    let mut bytes = std::fs::read(&good).unwrap();

    let name = "token_embd.weight";
    let mut pattern = (name.len() as u64).to_le_bytes().to_vec();
    pattern.extend(name.as_bytes());
    let pos = bytes.windows(pattern.len()).position(|w| w == pattern.as_slice()).unwrap();
    let dim0 = pos + pattern.len() + 4;
    bytes[dim0..dim0 + 8].copy_from_slice(&(1u64 << 62).to_le_bytes());
    let bad = dir.path().join("bad.gguf");
    std::fs::write(&bad, bytes).unwrap();

    let bridge = Bridge::new(config());
    assert!(matches!(bridge.load_model(&bad), Err(BridgeError::Load(_))));
    assert!(!bridge.is_loaded());
}

#[test]
fn test_session_failure_unloads_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let mut config = config();
    config.session.n_seq_max = 0;
    let bridge = Bridge::new(config);

    assert!(matches!(bridge.load_model(&path), Err(BridgeError::Session(_))));
    assert!(!bridge.is_loaded());
    assert!(bridge.model_info().is_none());
}

#[test]
fn test_streaming_matches_generate() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let bridge = Bridge::new(config());
    bridge.load_model(&path).unwrap();

    let mut streamed = String::new();
    let result = bridge
        .generate_streaming("The sky is", 10, |fragment| streamed.push_str(fragment))
        .unwrap();
    assert_eq!(streamed, result.text);
    assert_eq!(result, bridge.generate("The sky is", 10).unwrap());
}

#[test]
fn test_empty_prompt_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let bridge = Bridge::new(config());
    bridge.load_model(&path).unwrap();
    assert!(matches!(bridge.generate("", 5), Err(BridgeError::EmptyPrompt)));
}

#[test]
fn test_sampling_config_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "sky.gguf", &sky());
    let mut config = config();
    config.sampling.temperature = 0.9;
    config.session.seed = 99;
    let bridge = Bridge::new(config);
    bridge.load_model(&path).unwrap();

    let a = bridge.generate("The sky is", 12).unwrap();
    let b = bridge.generate("The sky is", 12).unwrap();
    assert_eq!(a, b);
    assert!(a.tokens_generated <= 12);
}
