//! End-to-end pipeline test: train through the background job slot, then
//! embed and rank with the committed model.

use std::path::Path;
use std::time::Duration;

use image::{GrayImage, Luma};

use graphis_core::{
    load_corpus, Architecture, Config, Graphis, JobState, TrainingParams, EMBEDDING_DIM,
};

fn write_sample(dir: &Path, writer: &str, name: &str, seed: u8) {
    let writer_dir = dir.join(writer);
    std::fs::create_dir_all(&writer_dir).unwrap();
    let img = GrayImage::from_fn(32, 32, |x, y| {
        Luma([((x * 3 + y * 17) as u8).wrapping_add(seed)])
    });
    img.save(writer_dir.join(name)).unwrap();
}

fn test_config(model_dir: &Path) -> Config {
    let mut config = Config::default();
    config.general.model_dir = model_dir.to_path_buf();
    config.model.architecture = Architecture::Simple;
    config.model.input_size = 8;
    config.training.epochs = 2;
    config.training.batch_size = 4;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn train_then_identify() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_dir = dir.path().join("corpus");
    write_sample(&corpus_dir, "alice", "a0.png", 0);
    write_sample(&corpus_dir, "alice", "a1.png", 12);
    write_sample(&corpus_dir, "bob", "b0.png", 120);
    write_sample(&corpus_dir, "bob", "b1.png", 135);

    let config = test_config(&dir.path().join("models"));
    let graphis = Graphis::new(config).unwrap();

    let corpus = load_corpus(&corpus_dir).unwrap();
    assert_eq!(corpus.len(), 4);

    let params = TrainingParams::from_config(&graphis.config().training);
    let params = TrainingParams {
        epochs: 2,
        batch_size: 4,
        ..params
    };
    graphis.submit_training(corpus.clone(), params).unwrap();

    let mut status = graphis.training_status();
    for _ in 0..600 {
        status = graphis.training_status();
        if status.state == JobState::Completed || status.state == JobState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(status.state, JobState::Completed, "error: {:?}", status.error);
    let result = status.result.unwrap();
    assert_eq!(result.version, 1);
    assert_eq!(result.version, graphis.registry().current().unwrap().version);

    // Embed every corpus sample with the committed model.
    let mut candidates = Vec::new();
    for sample in &corpus {
        let embedding = graphis.embed_file(&sample.image_path).unwrap();
        assert_eq!(embedding.dim(), EMBEDDING_DIM);
        candidates.push((sample.writer_id.clone(), embedding));
    }

    // Rank against one sample: it matches itself with similarity 1.
    let query = candidates[0].1.clone();
    let ranked = graphis.rank(&query, &candidates).unwrap();
    assert_eq!(ranked.len(), 4);
    assert!((ranked[0].score - 1.0).abs() < 1e-5);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}
