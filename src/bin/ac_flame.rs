use resilient_ac::{
    ArithmeticCodec, DecoderConfig, MarkovTable, OverlapBlend, SequentialDecoder, StaticBitModel,
};

fn main() -> resilient_ac::Result<()> {
    let bits = (0..4096).map(|i| u8::from(i % 3 == 0)).collect::<Vec<_>>();
    let received = bits
        .iter()
        .enumerate()
        .map(|(i, &bit)| if i % 41 == 7 { bit ^ 1 } else { bit })
        .collect::<Vec<_>>();

    let mut model = StaticBitModel::new();
    model.set_probability_0(0.66)?;
    model.set_overlap(0.1, OverlapBlend::Additive)?;
    let markov = MarkovTable::estimate(2, &bits)?;

    for _ in 0..50 {
        let mut codec = ArithmeticCodec::new(bits.len());
        codec.start_encoder()?;
        for &bit in &bits {
            codec.encode_bit(bit, &model)?;
        }
        codec.stop_encoder()?;

        let mut decoder = SequentialDecoder::new(DecoderConfig {
            node_count: 1 << 16,
            error: 0.05,
            termination: 0,
            markov: markov.clone(),
        })?;
        decoder.set_block(8, 64)?;
        decoder.decode(codec.code(), &received, &model)?;
    }
    Ok(())
}
