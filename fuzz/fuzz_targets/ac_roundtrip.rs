#![no_main]
use libfuzzer_sys::fuzz_target;
use resilient_ac::{AdaptiveDataModel, ArithmeticCodec};

fuzz_target!(|data: (Vec<u8>, u8)| {
    let (input_bytes, symbols) = data;
    let symbols = (symbols as usize % 254) + 2; // 2 to 255 symbols

    if input_bytes.is_empty() {
        return;
    }

    let input: Vec<usize> = input_bytes.iter().map(|&b| b as usize % symbols).collect();

    let mut model = AdaptiveDataModel::new(symbols).unwrap();
    let mut codec = ArithmeticCodec::new(input.len() * 2 + 16);
    codec.start_encoder().unwrap();
    for &symbol in &input {
        codec.encode_adaptive_symbol(symbol, &mut model).unwrap();
    }
    codec.stop_encoder().unwrap();

    let mut model = AdaptiveDataModel::new(symbols).unwrap();
    codec.start_decoder().unwrap();
    let mut output = Vec::new();
    for _ in 0..input.len() {
        output.push(codec.decode_adaptive_symbol(&mut model).unwrap());
    }

    assert_eq!(input, output);
});
