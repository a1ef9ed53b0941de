//! Interval arithmetic encoder and decoder.
//!
//! The coding interval is kept in 32-bit fixed point. Every symbol narrows
//! `[base, base + length)` to the slice its model assigns to it; once
//! `length` drops below [`AC_MIN_LENGTH`] the top byte of `base` is final and
//! is shifted out (renormalization). Narrowing can carry out of `base`, in
//! which case the carry ripples back through bytes already written.
//!
//! The decoder tracks `value`, the received code measured from `base`, and
//! repeats the encoder's integer expressions exactly, so `value < length`
//! holds after every step on a well-formed stream.

use std::io::{Read, Write};

use crate::error::{Error, Mode, Result};
use crate::model::{
    AdaptiveBitModel, AdaptiveDataModel, StaticBitModel, StaticDataModel, BM_LENGTH_SHIFT,
    DM_LENGTH_SHIFT,
};

/// Renormalize once the interval is shorter than this.
pub const AC_MIN_LENGTH: u32 = 0x0100_0000;
/// Length of the initial interval.
pub const AC_MAX_LENGTH: u32 = 0xFFFF_FFFF;

/// Interval state shared by encoder and decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interval {
    /// Lower bound (encoder).
    pub base: u32,
    /// Interval width.
    pub length: u32,
    /// Received code offset from `base` (decoder).
    pub value: u32,
}

/// Resumable decoder state: interval plus read position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Interval at the time of the snapshot.
    pub interval: Interval,
    /// Index of the next byte to read.
    pub position: usize,
}

/// Arithmetic encoder and decoder over a memory buffer.
#[derive(Debug)]
pub struct ArithmeticCodec {
    buffer: Vec<u8>,
    code_len: usize,
    mode: Mode,
    interval: Interval,
    position: usize,
}

impl ArithmeticCodec {
    /// Create a codec owning a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::with_buffer(vec![0; capacity])
    }

    /// Create a codec over caller-supplied storage.
    ///
    /// The whole buffer is the capacity for encoding and the code for
    /// decoding.
    pub fn with_buffer(buffer: Vec<u8>) -> Self {
        Self {
            code_len: buffer.len(),
            buffer,
            mode: Mode::Idle,
            interval: Interval::default(),
            position: 0,
        }
    }

    /// Replace the buffer with a fresh one of `capacity` bytes.
    ///
    /// # Errors
    /// Returns `Error::Mode` while a session is active.
    pub fn set_buffer(&mut self, capacity: usize) -> Result<()> {
        self.require_inactive("set_buffer")?;
        self.buffer = vec![0; capacity];
        self.code_len = capacity;
        self.mode = Mode::Idle;
        Ok(())
    }

    /// Move onto caller-supplied storage, returning the previous buffer.
    ///
    /// As with [`with_buffer`](Self::with_buffer), the whole new buffer is
    /// the capacity for encoding and the code for decoding.
    ///
    /// # Errors
    /// Returns `Error::Mode` while a session is active.
    pub fn set_user_buffer(&mut self, buffer: Vec<u8>) -> Result<Vec<u8>> {
        self.require_inactive("set_user_buffer")?;
        self.code_len = buffer.len();
        self.mode = Mode::Idle;
        Ok(std::mem::replace(&mut self.buffer, buffer))
    }

    /// The whole underlying buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The bytes of the last finished code (or the whole supplied buffer).
    pub fn code(&self) -> &[u8] {
        &self.buffer[..self.code_len]
    }

    /// Give the buffer back to the caller.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Current session state.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current interval state.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Next byte to write (encoder) or read (decoder).
    pub fn position(&self) -> usize {
        self.position
    }

    /// Start an encoder session.
    ///
    /// # Errors
    /// Returns `Error::Mode` while a session is active.
    pub fn start_encoder(&mut self) -> Result<()> {
        self.require_inactive("start_encoder")?;
        self.interval = Interval {
            base: 0,
            length: AC_MAX_LENGTH,
            value: 0,
        };
        self.position = 0;
        self.mode = Mode::Encoding;
        Ok(())
    }

    /// Start a decoder session on the current code.
    ///
    /// # Errors
    /// Returns `Error::Mode` while a session is active.
    pub fn start_decoder(&mut self) -> Result<()> {
        self.require_inactive("start_decoder")?;
        let mut value = 0;
        for position in 0..4 {
            value = (value << 8) | self.byte_at(position) as u32;
        }
        self.interval = Interval {
            base: 0,
            length: AC_MAX_LENGTH,
            value,
        };
        self.position = 4;
        self.mode = Mode::Decoding;
        Ok(())
    }

    /// Read a whole code stream from `reader` and start decoding it.
    ///
    /// # Errors
    /// Returns `Error::Mode` while a session is active, `Error::Io` on read
    /// failure.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<usize> {
        self.require_inactive("read_from")?;
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        self.code_len = buffer.len();
        self.buffer = buffer;
        self.start_decoder()?;
        Ok(self.code_len)
    }

    /// Stop the encoder and write the code to `writer`.
    ///
    /// # Errors
    /// Same as [`ArithmeticCodec::stop_encoder`], plus `Error::Io`.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> Result<usize> {
        let bytes = self.stop_encoder()?;
        writer.write_all(&self.buffer[..bytes])?;
        Ok(bytes)
    }

    /// Flush the interval and end the encoder session.
    ///
    /// Returns the number of code bytes.
    ///
    /// # Errors
    /// Returns `Error::Mode` outside an encoder session and
    /// `Error::BufferOverflow` if the final bytes do not fit.
    pub fn stop_encoder(&mut self) -> Result<usize> {
        self.require(Mode::Encoding, "stop_encoder")?;
        if self.interval.length > 2 * AC_MIN_LENGTH {
            self.advance_base(AC_MIN_LENGTH);
            self.interval.length = AC_MIN_LENGTH >> 1;
        } else {
            self.advance_base(AC_MIN_LENGTH >> 1);
            self.interval.length = AC_MIN_LENGTH >> 9;
        }
        self.renorm_enc_interval()?;
        self.code_len = self.position;
        self.mode = Mode::Stopped;
        Ok(self.code_len)
    }

    /// End the decoder session.
    ///
    /// # Errors
    /// Returns `Error::Mode` outside a decoder session.
    pub fn stop_decoder(&mut self) -> Result<()> {
        self.require(Mode::Decoding, "stop_decoder")?;
        self.mode = Mode::Stopped;
        Ok(())
    }

    /// Write one equiprobable bit.
    pub fn put_bit(&mut self, bit: u8) -> Result<()> {
        self.require(Mode::Encoding, "put_bit")?;
        self.interval.length >>= 1;
        if bit != 0 {
            self.advance_base(self.interval.length);
        }
        self.renorm_enc_if_needed()
    }

    /// Read one equiprobable bit.
    pub fn get_bit(&mut self) -> Result<u8> {
        self.require(Mode::Decoding, "get_bit")?;
        self.check_value()?;
        self.interval.length >>= 1;
        let bit = self.interval.value >= self.interval.length;
        if bit {
            self.interval.value -= self.interval.length;
        }
        self.renorm_dec_if_needed();
        Ok(u8::from(bit))
    }

    /// Write `bits` raw bits of `data`, bypassing any model.
    ///
    /// # Errors
    /// Returns `Error::BitField` unless `1 <= bits <= 20` and `data < 2^bits`.
    pub fn put_bits(&mut self, data: u32, bits: u32) -> Result<()> {
        self.require(Mode::Encoding, "put_bits")?;
        if !(1..=20).contains(&bits) || data >> bits != 0 {
            return Err(Error::BitField { data, bits });
        }
        self.interval.length >>= bits;
        self.advance_base(data * self.interval.length);
        self.renorm_enc_if_needed()
    }

    /// Read `bits` raw bits.
    ///
    /// # Errors
    /// Returns `Error::BitField` unless `1 <= bits <= 20`.
    pub fn get_bits(&mut self, bits: u32) -> Result<u32> {
        self.require(Mode::Decoding, "get_bits")?;
        if !(1..=20).contains(&bits) {
            return Err(Error::BitField { data: 0, bits });
        }
        self.check_value()?;
        self.interval.length >>= bits;
        let data = self.interval.value / self.interval.length;
        if data >> bits != 0 {
            return Err(self.desync());
        }
        self.interval.value -= self.interval.length * data;
        self.renorm_dec_if_needed();
        Ok(data)
    }

    /// Encode a bit with a static model.
    pub fn encode_bit(&mut self, bit: u8, model: &StaticBitModel) -> Result<()> {
        self.require(Mode::Encoding, "encode_bit")?;
        let step = self.interval.length >> BM_LENGTH_SHIFT;
        if bit == 0 {
            self.interval.length = model.bit_0_high * step;
        } else {
            let x = model.bit_1_low * step;
            self.advance_base(x);
            self.interval.length -= x;
        }
        self.renorm_enc_if_needed()
    }

    /// Decode a bit with a static model.
    ///
    /// # Errors
    /// Returns `Error::AmbiguousDecode` if the model is overlapped and the
    /// value falls in the shared region.
    pub fn decode_bit(&mut self, model: &StaticBitModel) -> Result<u8> {
        self.require(Mode::Decoding, "decode_bit")?;
        self.check_value()?;
        let step = self.interval.length >> BM_LENGTH_SHIFT;
        let x0 = model.bit_0_high * step;
        let x1 = model.bit_1_low * step;
        let value = self.interval.value;
        let bit = if value < x1 {
            self.interval.length = x0;
            0
        } else if value >= x0 {
            self.interval.value -= x1;
            self.interval.length -= x1;
            1
        } else {
            return Err(Error::AmbiguousDecode {
                position: self.position,
            });
        };
        self.renorm_dec_if_needed();
        Ok(bit)
    }

    /// Narrow to `bit` if the value lies in its interval.
    ///
    /// Returns `false` and leaves the state untouched when it does not. On an
    /// overlapped model both bits may be accepted from the same state.
    pub fn decode_hypothesis(&mut self, bit: u8, model: &StaticBitModel) -> Result<bool> {
        self.require(Mode::Decoding, "decode_hypothesis")?;
        self.check_value()?;
        let step = self.interval.length >> BM_LENGTH_SHIFT;
        if bit == 0 {
            let x0 = model.bit_0_high * step;
            if self.interval.value >= x0 {
                return Ok(false);
            }
            self.interval.length = x0;
        } else {
            let x1 = model.bit_1_low * step;
            if self.interval.value < x1 {
                return Ok(false);
            }
            self.interval.value -= x1;
            self.interval.length -= x1;
        }
        self.renorm_dec_if_needed();
        Ok(true)
    }

    /// Encode a bit with an adaptive model and update it.
    pub fn encode_adaptive_bit(&mut self, bit: u8, model: &mut AdaptiveBitModel) -> Result<()> {
        self.require(Mode::Encoding, "encode_adaptive_bit")?;
        let x = model.bit_0_prob * (self.interval.length >> BM_LENGTH_SHIFT);
        if bit == 0 {
            self.interval.length = x;
        } else {
            self.advance_base(x);
            self.interval.length -= x;
        }
        model.observe(bit);
        self.renorm_enc_if_needed()
    }

    /// Decode a bit with an adaptive model and update it.
    pub fn decode_adaptive_bit(&mut self, model: &mut AdaptiveBitModel) -> Result<u8> {
        self.require(Mode::Decoding, "decode_adaptive_bit")?;
        self.check_value()?;
        let x = model.bit_0_prob * (self.interval.length >> BM_LENGTH_SHIFT);
        let bit = if self.interval.value < x {
            self.interval.length = x;
            0
        } else {
            self.interval.value -= x;
            self.interval.length -= x;
            1
        };
        model.observe(bit);
        self.renorm_dec_if_needed();
        Ok(bit)
    }

    /// Encode a symbol with a static model.
    pub fn encode_symbol(&mut self, symbol: usize, model: &StaticDataModel) -> Result<()> {
        self.require(Mode::Encoding, "encode_symbol")?;
        self.encode_distribution(symbol, &model.distribution)
    }

    /// Decode a symbol with a static model.
    pub fn decode_symbol(&mut self, model: &StaticDataModel) -> Result<usize> {
        self.require(Mode::Decoding, "decode_symbol")?;
        self.decode_distribution(&model.distribution)
    }

    /// Encode a symbol with an adaptive model and update it.
    pub fn encode_adaptive_symbol(
        &mut self,
        symbol: usize,
        model: &mut AdaptiveDataModel,
    ) -> Result<()> {
        self.require(Mode::Encoding, "encode_adaptive_symbol")?;
        self.encode_distribution(symbol, &model.distribution)?;
        model.observe(symbol);
        Ok(())
    }

    /// Decode a symbol with an adaptive model and update it.
    pub fn decode_adaptive_symbol(&mut self, model: &mut AdaptiveDataModel) -> Result<usize> {
        self.require(Mode::Decoding, "decode_adaptive_symbol")?;
        let symbol = self.decode_distribution(&model.distribution)?;
        model.observe(symbol);
        Ok(symbol)
    }

    /// Capture the decoder state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            interval: self.interval,
            position: self.position,
        }
    }

    /// Resume decoding from a snapshot taken on the same code.
    ///
    /// # Errors
    /// Returns `Error::Mode` outside a decoder session.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        self.require(Mode::Decoding, "restore")?;
        self.interval = snapshot.interval;
        self.position = snapshot.position;
        Ok(())
    }

    fn encode_distribution(&mut self, symbol: usize, distribution: &[u32]) -> Result<()> {
        let last = distribution.len() - 1;
        if symbol > last {
            return Err(Error::ModelConfig(format!(
                "symbol {symbol} outside alphabet of {}",
                distribution.len()
            )));
        }
        if symbol == last {
            let x = distribution[symbol] * (self.interval.length >> DM_LENGTH_SHIFT);
            self.advance_base(x);
            self.interval.length -= x;
        } else {
            self.interval.length >>= DM_LENGTH_SHIFT;
            let x = distribution[symbol] * self.interval.length;
            self.advance_base(x);
            self.interval.length = distribution[symbol + 1] * self.interval.length - x;
        }
        self.renorm_enc_if_needed()
    }

    fn decode_distribution(&mut self, distribution: &[u32]) -> Result<usize> {
        self.check_value()?;
        let value = self.interval.value;
        let step = self.interval.length >> DM_LENGTH_SHIFT;

        // bisection: the answer stays in [s, n), with x and y its bounds
        let (mut s, mut n) = (0, distribution.len());
        let (mut x, mut y) = (0, self.interval.length);
        let mut m = n >> 1;
        loop {
            let z = step * distribution[m];
            if z > value {
                n = m;
                y = z;
            } else {
                s = m;
                x = z;
            }
            m = (s + n) >> 1;
            if m == s {
                break;
            }
        }

        self.interval.value -= x;
        self.interval.length = y - x;
        self.renorm_dec_if_needed();
        Ok(s)
    }

    fn advance_base(&mut self, x: u32) {
        let (base, carry) = self.interval.base.overflowing_add(x);
        self.interval.base = base;
        if carry {
            self.propagate_carry();
        }
    }

    fn propagate_carry(&mut self) {
        for byte in self.buffer[..self.position].iter_mut().rev() {
            if *byte == 0xFF {
                *byte = 0;
            } else {
                *byte += 1;
                return;
            }
        }
    }

    fn renorm_enc_if_needed(&mut self) -> Result<()> {
        if self.interval.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        Ok(())
    }

    fn renorm_enc_interval(&mut self) -> Result<()> {
        let capacity = self.buffer.len();
        loop {
            let byte = (self.interval.base >> 24) as u8;
            let slot = self
                .buffer
                .get_mut(self.position)
                .ok_or(Error::BufferOverflow { capacity })?;
            *slot = byte;
            self.position += 1;
            self.interval.base <<= 8;
            self.interval.length <<= 8;
            if self.interval.length >= AC_MIN_LENGTH {
                return Ok(());
            }
        }
    }

    fn renorm_dec_if_needed(&mut self) {
        while self.interval.length < AC_MIN_LENGTH {
            let byte = self.byte_at(self.position);
            self.interval.value = (self.interval.value << 8) | byte as u32;
            self.interval.length <<= 8;
            self.position += 1;
        }
    }

    fn byte_at(&self, position: usize) -> u8 {
        if position < self.code_len {
            self.buffer[position]
        } else {
            0
        }
    }

    fn check_value(&self) -> Result<()> {
        if self.interval.value >= self.interval.length {
            return Err(self.desync());
        }
        Ok(())
    }

    fn desync(&self) -> Error {
        Error::DecodeDesync {
            position: self.position,
        }
    }

    fn require(&self, mode: Mode, op: &'static str) -> Result<()> {
        if self.mode != mode {
            return Err(Error::Mode { op, mode: self.mode });
        }
        Ok(())
    }

    fn require_inactive(&self, op: &'static str) -> Result<()> {
        match self.mode {
            Mode::Encoding | Mode::Decoding => Err(Error::Mode { op, mode: self.mode }),
            Mode::Idle | Mode::Stopped => Ok(()),
        }
    }
}
