use criterion::{criterion_group, criterion_main, Criterion};
use resilient_ac::{
    AdaptiveDataModel, ArithmeticCodec, DecoderConfig, MarkovTable, OverlapBlend,
    SequentialDecoder, StaticBitModel,
};

fn bench_adaptive_symbols(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_symbols");
    let input = (0..1000).map(|i| (i * i) % 7).collect::<Vec<_>>();

    group.bench_function("encode", |b| {
        b.iter(|| {
            let mut model = AdaptiveDataModel::new(7).unwrap();
            let mut codec = ArithmeticCodec::new(2048);
            codec.start_encoder().unwrap();
            for &symbol in &input {
                codec.encode_adaptive_symbol(symbol, &mut model).unwrap();
            }
            codec.stop_encoder().unwrap()
        })
    });

    let mut model = AdaptiveDataModel::new(7).unwrap();
    let mut codec = ArithmeticCodec::new(2048);
    codec.start_encoder().unwrap();
    for &symbol in &input {
        codec.encode_adaptive_symbol(symbol, &mut model).unwrap();
    }
    codec.stop_encoder().unwrap();
    let code = codec.code().to_vec();

    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut model = AdaptiveDataModel::new(7).unwrap();
            let mut codec = ArithmeticCodec::with_buffer(code.clone());
            codec.start_decoder().unwrap();
            for _ in 0..input.len() {
                codec.decode_adaptive_symbol(&mut model).unwrap();
            }
        })
    });
}

fn bench_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential");
    let bits = (0..512).map(|i| u8::from(i % 3 == 0)).collect::<Vec<_>>();
    let received = bits
        .iter()
        .enumerate()
        .map(|(i, &bit)| if i % 37 == 5 { bit ^ 1 } else { bit })
        .collect::<Vec<_>>();

    let mut model = StaticBitModel::new();
    model.set_probability_0(0.66).unwrap();
    model.set_overlap(0.1, OverlapBlend::Additive).unwrap();
    let mut codec = ArithmeticCodec::new(1024);
    codec.start_encoder().unwrap();
    for &bit in &bits {
        codec.encode_bit(bit, &model).unwrap();
    }
    codec.stop_encoder().unwrap();
    let code = codec.code().to_vec();
    let markov = MarkovTable::estimate(2, &bits).unwrap();

    for max_node in [16, 64] {
        group.bench_function(format!("decode_m{max_node}"), |b| {
            b.iter(|| {
                let mut decoder = SequentialDecoder::new(DecoderConfig {
                    node_count: 1 << 16,
                    error: 0.05,
                    termination: 0,
                    markov: markov.clone(),
                })
                .unwrap();
                decoder.set_block(8, max_node).unwrap();
                decoder.decode(&code, &received, &model).unwrap()
            })
        });
    }
}

criterion_group!(benches, bench_adaptive_symbols, bench_sequential);
criterion_main!(benches);
