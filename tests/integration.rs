//! End-to-end integration tests for kge-denoise.
//!
//! These tests load a small dataset from disk, assemble an engine and run
//! sampling, training, confidence refreshes and evaluation together.

use std::path::Path;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use kge_denoise::config::{Method, RunConfig};
use kge_denoise::confidence::mode::ConfidenceMode;
use kge_denoise::engine::Engine;
use kge_denoise::error::{DataError, KgeError};
use kge_denoise::graph::index::TrueTripleIndex;
use kge_denoise::graph::{CorruptionMode, Triple};
use kge_denoise::model::ModelKind;
use kge_denoise::sampler::dataset::TrainDataset;
use kge_denoise::sampler::iterator::{BatchStream, BidirectionalIterator};
use kge_denoise::sampler::weights::WeightTable;
use kge_denoise::sampler::worker_pool;
use kge_denoise::store::{fake_path, write_fakes};

const A: u32 = 0;
const B: u32 = 1;
const C: u32 = 2;
const D: u32 = 3;
const R: u32 = 0;

/// Four entities, one relation, train {(A,r,B), (B,r,C)}.
fn write_abcd(dir: &Path) {
    std::fs::write(dir.join("entities.dict"), "0\tA\n1\tB\n2\tC\n3\tD\n").unwrap();
    std::fs::write(dir.join("relations.dict"), "0\tr\n").unwrap();
    std::fs::write(dir.join("train.txt"), "A\tr\tB\nB\tr\tC\n").unwrap();
    std::fs::write(dir.join("valid.txt"), "C\tr\tD\n").unwrap();
    std::fs::write(dir.join("test.txt"), "D\tr\tA\n").unwrap();
}

/// A chain of `n` entities over two relations, with valid/test drawn from train.
fn write_chain(dir: &Path, n: usize) {
    let entities: String = (0..n).map(|i| format!("{i}\te{i}\n")).collect();
    std::fs::write(dir.join("entities.dict"), entities).unwrap();
    std::fs::write(dir.join("relations.dict"), "0\tnext\n1\tprev\n").unwrap();
    let mut train = String::new();
    for i in 0..n - 1 {
        train.push_str(&format!("e{i}\tnext\te{}\n", i + 1));
        train.push_str(&format!("e{}\tprev\te{i}\n", i + 1));
    }
    std::fs::write(dir.join("train.txt"), train).unwrap();
    std::fs::write(dir.join("valid.txt"), "e0\tnext\te1\ne2\tprev\te1\n").unwrap();
    std::fs::write(dir.join("test.txt"), "e3\tnext\te4\ne5\tprev\te4\n").unwrap();
}

/// Every `(x, r, y)` over `n` entities is a training triple.
fn write_complete(dir: &Path, n: usize) {
    let entities: String = (0..n).map(|i| format!("{i}\te{i}\n")).collect();
    std::fs::write(dir.join("entities.dict"), entities).unwrap();
    std::fs::write(dir.join("relations.dict"), "0\tr\n").unwrap();
    let train: String = (0..n)
        .flat_map(|h| (0..n).map(move |t| format!("e{h}\tr\te{t}\n")))
        .collect();
    std::fs::write(dir.join("train.txt"), train).unwrap();
    std::fs::write(dir.join("valid.txt"), "e0\tr\te1\n").unwrap();
    std::fs::write(dir.join("test.txt"), "e1\tr\te0\n").unwrap();
}

fn small_config(data: &Path, save: &Path) -> RunConfig {
    RunConfig {
        do_train: true,
        data_path: Some(data.to_path_buf()),
        save_path: Some(save.to_path_buf()),
        model: ModelKind::TransE,
        hidden_dim: 8,
        gen_dim: 4,
        gamma: 6.0,
        negative_sample_size: 2,
        batch_size: 4,
        test_batch_size: 2,
        learning_rate: 0.01,
        cpu_num: 2,
        max_steps: 40,
        log_steps: 10,
        save_checkpoint_steps: 20,
        valid_steps: 20,
        refresh_interval: 20,
        gan_epochs: 5,
        classifier_epochs: 20,
        classifier_warmup_epochs: 10,
        kbgan_log_steps: 10,
        seed: 7,
        ..RunConfig::default()
    }
}

#[test]
fn negatives_avoid_other_known_truths() {
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_abcd(data.path());
    let engine = Engine::new(small_config(data.path(), save.path()).resolve().unwrap()).unwrap();

    let tail = engine.train_iter().tail_dataset();
    assert_eq!(tail.mode(), CorruptionMode::TailBatch);
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..200 {
        let negatives = tail.negatives_for(Triple::new(A, R, B), &mut rng);
        assert_eq!(negatives.len(), 2);
        assert!(!negatives.contains(&B), "B is a known tail of (A, r)");
        assert!(negatives.iter().all(|e| [A, C, D].contains(e)));
    }
}

#[test]
fn target_under_evaluation_is_not_filtered() {
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_abcd(data.path());
    let engine = Engine::new(small_config(data.path(), save.path()).resolve().unwrap()).unwrap();

    let metrics = engine.evaluate(&[Triple::new(A, R, B)]);
    assert_eq!(metrics.count, 2);
    assert!(metrics.mr >= 1.0 && metrics.mr <= 4.0);
    assert!(metrics.mrr > 0.0 && metrics.mrr <= 1.0);

    // Every other candidate is a known truth, so only the target is left.
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_complete(data.path(), 4);
    let engine = Engine::new(small_config(data.path(), save.path()).resolve().unwrap()).unwrap();
    let metrics = engine.evaluate(&[Triple::new(0, 0, 1), Triple::new(3, 0, 2)]);
    assert_eq!(metrics.count, 4);
    assert_eq!(metrics.mr, 1.0);
    assert_eq!(metrics.mrr, 1.0);
    assert_eq!(metrics.hits_at_1, 1.0);
}

#[test]
fn bidirectional_iterator_alternates_head_then_tail() {
    let triples = Arc::new(vec![Triple::new(A, R, B), Triple::new(B, R, C)]);
    let index = Arc::new(TrueTripleIndex::build([&triples[..]]));
    let weights = WeightTable::uniform(&triples);
    let pool = worker_pool(2).unwrap();
    let stream = |mode, seed| {
        let dataset = TrainDataset::new(
            Arc::clone(&triples),
            4,
            2,
            mode,
            Arc::clone(&index),
            weights.clone(),
        );
        BatchStream::new(Arc::new(dataset), 1, seed, Arc::clone(&pool)).unwrap()
    };
    let iter = BidirectionalIterator::new(
        stream(CorruptionMode::HeadBatch, 0),
        stream(CorruptionMode::TailBatch, 1),
    );

    let modes: Vec<_> = iter.take(4).map(|b| b.mode).collect();
    assert_eq!(
        modes,
        [
            CorruptionMode::HeadBatch,
            CorruptionMode::TailBatch,
            CorruptionMode::HeadBatch,
            CorruptionMode::TailBatch
        ]
    );
}

#[test]
fn refresh_is_visible_to_both_corruption_directions() {
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_chain(data.path(), 8);
    let config = RunConfig {
        method: Some(Method::Clf),
        ..small_config(data.path(), save.path())
    };
    let engine = Engine::new(config.resolve().unwrap()).unwrap();
    let parts = engine.clf().unwrap();
    assert!(!parts.pool.is_empty());

    let train = &engine.store().train;
    let pools = [&train[..], &parts.pool[..]];
    let report = parts.classifier.find_topk_triples(
        engine.model(),
        &pools,
        engine.weights(),
        ConfidenceMode::Hard,
    );
    assert_eq!(report.updated, train.len());

    let iter = engine.train_iter();
    for t in train {
        let w = engine.weights().get(t);
        assert!(w == 0.0 || w == 1.0);
        assert_eq!(iter.head_dataset().weights().get(t), w);
        assert_eq!(iter.tail_dataset().weights().get(t), w);
        assert_eq!(parts.clf_iter.weights().get(t), w);
    }
}

#[test]
fn plain_training_lowers_loss_and_writes_checkpoints() {
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_chain(data.path(), 8);
    let config = RunConfig {
        do_valid: true,
        do_test: true,
        evaluate_train: true,
        max_steps: 200,
        ..small_config(data.path(), save.path())
    };
    let mut engine = Engine::new(config.resolve().unwrap()).unwrap();
    let before = engine.evaluate(&engine.store().train);
    engine.run().unwrap();
    let after = engine.evaluate(&engine.store().train);

    assert_eq!(engine.step(), 199);
    assert!(after.mrr.is_finite());
    assert!(after.mr <= before.mr + 1.0, "MR went from {} to {}", before.mr, after.mr);
    assert!(save.path().join("checkpoint").exists());
    assert!(save.path().join("config.json").exists());
}

#[test]
fn clf_run_pushes_the_fake_below_full_confidence() {
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_chain(data.path(), 8);
    let fake = Triple::new(0, 0, 7);
    write_fakes(&fake_path(data.path(), "1"), &[fake]).unwrap();

    let config = RunConfig {
        method: Some(Method::Clf),
        fake: Some("1".into()),
        do_test: true,
        max_steps: 60,
        ..small_config(data.path(), save.path())
    };
    let mut engine = Engine::new(config.resolve().unwrap()).unwrap();
    assert_eq!(engine.store().fakes, vec![fake]);
    engine.run().unwrap();

    let weights = engine.weights();
    assert!(weights.get(&fake) < 1.0);
    for t in &engine.store().train {
        let w = weights.get(t);
        assert!((0.0..=1.0).contains(&w), "weight {w} of {t} out of range");
    }

    let report = engine.detection_report();
    assert_eq!(report.fake_count, 1);
    assert!((0.0..=1.0).contains(&report.real.auc));
}

/// Fakes that no single translation per relation can satisfy on a chain.
fn chain_fakes() -> Vec<Triple> {
    let (next, prev) = (0, 1);
    vec![
        Triple::new(0, next, 9),
        Triple::new(2, next, 12),
        Triple::new(13, prev, 5),
        Triple::new(14, next, 3),
    ]
}

fn mean_weight(engine: &Engine, triples: &[Triple]) -> f32 {
    triples.iter().map(|t| engine.weights().get(t)).sum::<f32>() / triples.len() as f32
}

#[test]
fn clf_run_weighs_fakes_below_consistent_triples() {
    for seed in [1, 2, 3] {
        let data = tempfile::TempDir::new().unwrap();
        let save = tempfile::TempDir::new().unwrap();
        write_chain(data.path(), 16);
        let fakes = chain_fakes();
        write_fakes(&fake_path(data.path(), "1"), &fakes).unwrap();

        let config = RunConfig {
            method: Some(Method::Clf),
            fake: Some("1".into()),
            hidden_dim: 8,
            negative_sample_size: 4,
            batch_size: 8,
            learning_rate: 0.05,
            max_steps: 600,
            refresh_interval: 100,
            classifier_epochs: 50,
            save_checkpoint_steps: 1000,
            valid_steps: 1000,
            seed,
            ..small_config(data.path(), save.path())
        };
        let mut engine = Engine::new(config.resolve().unwrap()).unwrap();
        engine.run().unwrap();

        // Valid and test triples are drawn from the chain itself.
        let store = engine.store();
        let real: Vec<Triple> = store.valid.iter().chain(&store.test).copied().collect();
        let real_weight = mean_weight(&engine, &real);
        let fake_weight = mean_weight(&engine, &fakes);
        assert!(
            fake_weight + 0.02 < real_weight,
            "seed {seed}: fakes at {fake_weight}, chain triples at {real_weight}"
        );
    }
}

#[test]
fn kbgan_run_trains_the_generator() {
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_chain(data.path(), 6);
    let config = RunConfig {
        method: Some(Method::Kbgan),
        max_steps: 30,
        ..small_config(data.path(), save.path())
    };
    let mut engine = Engine::new(config.resolve().unwrap()).unwrap();
    let before = engine.model().clone();
    engine.run().unwrap();
    assert_ne!(engine.model(), &before);
    assert!(engine.clf().is_none());
}

#[test]
fn malformed_training_line_aborts_loading() {
    let data = tempfile::TempDir::new().unwrap();
    let save = tempfile::TempDir::new().unwrap();
    write_abcd(data.path());
    std::fs::write(data.path().join("train.txt"), "A\tr\tB\nB\tr\n").unwrap();

    let err = Engine::new(small_config(data.path(), save.path()).resolve().unwrap())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        KgeError::Data(DataError::MalformedLine { line: 2, .. })
    ));
}
