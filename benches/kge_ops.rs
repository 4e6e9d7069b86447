//! Benchmarks for scoring, training steps and negative sampling.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use kge_denoise::graph::index::TrueTripleIndex;
use kge_denoise::graph::{CorruptionMode, Triple};
use kge_denoise::model::optim::EmbeddingOptimizer;
use kge_denoise::model::{KgeModel, LossOptions, ModelKind, ModelShape};
use kge_denoise::sampler::Batch;
use kge_denoise::sampler::dataset::TrainDataset;
use kge_denoise::sampler::weights::WeightTable;

const NENTITY: usize = 2_000;

fn model(kind: ModelKind) -> KgeModel {
    let (de, dr) = kind.required_doubling();
    let shape = ModelShape {
        kind,
        nentity: NENTITY,
        nrelation: 10,
        hidden_dim: 200,
        gamma: 12.0,
        double_entity_embedding: de,
        double_relation_embedding: dr,
    };
    KgeModel::new(shape, &mut StdRng::seed_from_u64(0)).unwrap()
}

fn triples(n: u32) -> Vec<Triple> {
    (0..n).map(|i| Triple::new(i % NENTITY as u32, i % 10, (i * 7 + 1) % NENTITY as u32)).collect()
}

fn bench_score_candidates(c: &mut Criterion) {
    for kind in [ModelKind::TransE, ModelKind::RotatE] {
        let model = model(kind);
        let t = Triple::new(1, 2, 3);
        let mut out = vec![0.0f32; NENTITY];
        c.bench_function(&format!("score_candidates_{kind}_2k"), |bench| {
            bench.iter(|| {
                model.score_candidates(black_box(&t), CorruptionMode::TailBatch, &mut out);
                black_box(out[0])
            })
        });
    }
}

fn bench_train_step(c: &mut Criterion) {
    let mut model = model(ModelKind::TransE);
    let mut optimizer = EmbeddingOptimizer::new(1e-3, &model);
    let positives = triples(256);
    let negative_size = 64;
    let batch = Batch {
        negatives: (0..positives.len() * negative_size).map(|i| (i % NENTITY) as u32).collect(),
        weights: vec![1.0; positives.len()],
        positives,
        mode: CorruptionMode::TailBatch,
        negative_size,
    };
    let opts = LossOptions {
        adversarial_temperature: Some(1.0),
        ..LossOptions::default()
    };

    c.bench_function("train_step_transe_256x64", |bench| {
        bench.iter(|| black_box(model.train_step(&mut optimizer, &batch, &opts)))
    });
}

fn bench_negative_sampling(c: &mut Criterion) {
    let train = Arc::new(triples(20_000));
    let index = Arc::new(TrueTripleIndex::build([&train[..]]));
    let weights = WeightTable::uniform(&train);
    let dataset = TrainDataset::new(
        Arc::clone(&train),
        NENTITY,
        256,
        CorruptionMode::HeadBatch,
        index,
        weights,
    );
    let mut rng = StdRng::seed_from_u64(0);

    c.bench_function("negatives_for_256", |bench| {
        bench.iter(|| black_box(dataset.negatives_for(train[17], &mut rng)))
    });
}

criterion_group!(
    benches,
    bench_score_candidates,
    bench_train_step,
    bench_negative_sampling
);
criterion_main!(benches);
