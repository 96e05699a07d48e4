use criterion::{black_box, criterion_group, criterion_main, Criterion};
use voice_gateway_pipeline::{ChunkMode, ChunkerConfig, TextChunker};

const SAMPLE: &str = "Dr. Smith met with the fleet manager, e.g. the one on duty, \
to review weather conditions. The vessel departed at dawn. It returned by dusk, \
and the crew logged the catch. Mrs. Alvarez signed off on the report.";

fn bench_sentence_mode(c: &mut Criterion) {
    c.bench_function("chunker_sentence_mode", |b| {
        b.iter(|| {
            let mut chunker = TextChunker::new(ChunkerConfig {
                mode: ChunkMode::Sentence,
                min_chunk_len: 10,
                max_chunk_len: 500,
            });
            let mut chunks = chunker.push(black_box(SAMPLE));
            if let Some(last) = chunker.flush() {
                chunks.push(last);
            }
            black_box(chunks)
        })
    });
}

criterion_group!(benches, bench_sentence_mode);
criterion_main!(benches);
