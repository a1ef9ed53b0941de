use proptest::prelude::*;
use resilient_ac::{
    ArithmeticCodec, BranchWeights, DecoderConfig, MarkovContext, MarkovTable, OverlapBlend,
    SequentialDecoder, StaticBitModel, StaticDataModel,
};

fn encode(bits: &[u8], model: &StaticBitModel, termination: usize) -> Vec<u8> {
    let mut codec = ArithmeticCodec::new(bits.len() + 16);
    codec.start_encoder().unwrap();
    let plain = model.without_overlap();
    for (i, &bit) in bits.iter().enumerate() {
        let model = if i >= bits.len() - termination { &plain } else { model };
        codec.encode_bit(bit, model).unwrap();
    }
    codec.stop_encoder().unwrap();
    codec.code().to_vec()
}

/// Weight of one candidate path, or `None` if the code rules it out.
fn path_weight(
    code: &[u8],
    bits: &[u8],
    received: &[u8],
    model: &StaticBitModel,
    markov: &MarkovTable,
    weights: &BranchWeights,
    termination: usize,
) -> Option<f64> {
    let mut codec = ArithmeticCodec::with_buffer(code.to_vec());
    codec.start_decoder().unwrap();
    let mut context = MarkovContext::new(markov.order());
    let mut weight = 0.0;
    for (i, (&bit, &r)) in bits.iter().zip(received).enumerate() {
        let delta = if i >= bits.len() - termination {
            if codec.decode_bit(&model.without_overlap()).unwrap() != bit {
                return None;
            }
            weights.channel(r, bit)
        } else {
            if !codec.decode_hypothesis(bit, model).unwrap() {
                return None;
            }
            if context.is_established() {
                weights.channel(r, bit) + markov.log_probability(context.history(), bit)
            } else {
                weights.conditioned(r, bit)
            }
        };
        weight += delta;
        context.push(bit);
    }
    Some(weight)
}

proptest! {
    #[test]
    fn test_static_symbols_roundtrip(
        input in prop::collection::vec(0..3usize, 1..300),
        a in 1u32..100,
        b in 1u32..100,
    ) {
        let total = (a + b + 50) as f64;
        let probability = [a as f64 / total, b as f64 / total, 50.0 / total];
        let model = StaticDataModel::new(3, Some(&probability)).unwrap();

        let mut codec = ArithmeticCodec::new(input.len() * 2 + 16);
        codec.start_encoder().unwrap();
        for &symbol in &input {
            codec.encode_symbol(symbol, &model).unwrap();
        }
        codec.stop_encoder().unwrap();

        codec.start_decoder().unwrap();
        let output: Vec<usize> = (0..input.len())
            .map(|_| codec.decode_symbol(&model).unwrap())
            .collect();
        prop_assert_eq!(input, output);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_noiseless_search_returns_source(
        bits in prop::collection::vec(0u8..2, 1..80),
        overlap in 0.0f64..0.3,
        max_node in 1usize..8,
        block_size in 1usize..7,
        termination in 0usize..4,
    ) {
        let termination = termination.min(bits.len());
        let mut model = StaticBitModel::new();
        model.set_overlap(overlap, OverlapBlend::Additive).unwrap();
        let code = encode(&bits, &model, termination);

        let mut decoder = SequentialDecoder::new(DecoderConfig {
            node_count: 1 << 12,
            error: 0.0,
            termination,
            markov: MarkovTable::default(),
        })
        .unwrap();
        decoder.set_block(block_size, max_node).unwrap();
        let output = decoder.decode(&code, &bits, &model).unwrap();
        prop_assert_eq!(output.survivors, 1);
        prop_assert_eq!(output.bits, bits);
    }

    #[test]
    fn test_wide_beam_matches_exhaustive_search(
        bits in prop::collection::vec(0u8..2, 1..=8),
        flips in prop::collection::vec(any::<bool>(), 8),
        p0 in 0.2f64..0.8,
        overlap in 0.0f64..0.3,
        error in 0.01f64..0.3,
        conditionals in prop::collection::vec(0.1f64..0.9, 4),
        termination in 0usize..3,
        multiplicative in any::<bool>(),
    ) {
        let n = bits.len();
        let termination = termination.min(n);
        let blend = if multiplicative {
            OverlapBlend::Multiplicative
        } else {
            OverlapBlend::Additive
        };
        let mut model = StaticBitModel::new();
        model.set_probability_0(p0).unwrap();
        model.set_overlap(overlap, blend).unwrap();
        let markov = MarkovTable::from_conditionals(2, &conditionals).unwrap();
        let weights = BranchWeights::new(error, &model);

        let code = encode(&bits, &model, termination);
        let received: Vec<u8> = bits
            .iter()
            .zip(&flips)
            .map(|(&bit, &flip)| bit ^ u8::from(flip))
            .collect();

        let mut best = f64::NEG_INFINITY;
        for mask in 0u32..(1 << n) {
            let candidate: Vec<u8> = (0..n).map(|i| ((mask >> i) & 1) as u8).collect();
            let weight = path_weight(
                &code,
                &candidate,
                &received,
                &model,
                &markov,
                &weights,
                termination,
            );
            if let Some(w) = weight {
                best = best.max(w);
            }
        }
        prop_assert!(best.is_finite());

        let mut decoder = SequentialDecoder::new(DecoderConfig {
            node_count: 1 << (n + 2),
            error,
            termination,
            markov: markov.clone(),
        })
        .unwrap();
        decoder.set_block(n, 1 << n).unwrap();
        let output = decoder.decode(&code, &received, &model).unwrap();

        prop_assert!((output.weight - best).abs() < 1e-9);
        let own = path_weight(
            &code,
            &output.bits,
            &received,
            &model,
            &markov,
            &weights,
            termination,
        );
        prop_assert!(own.is_some());
        prop_assert!((own.unwrap() - output.weight).abs() < 1e-9);
    }
}
