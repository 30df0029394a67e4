//! Stateful linear-interpolation sample rate converter.
//!
//! Each output sample `k` sits at input time `k * from / to`. The converter
//! keeps the last input sample and the fractional read position between
//! calls, so a stream fed in pieces produces exactly the same samples as the
//! stream fed in one call. The cost is one input sample of latency.

/// Filter memory carried between calls for one direction of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResampleState {
    /// Last input sample of the previous call, used as index 0 of the next window.
    last: Option<i16>,
    /// Read position in units of `1 / step_out` input samples, relative to `last`.
    position: u64,
}

impl ResampleState {
    /// Whether the state holds no history.
    pub fn is_empty(&self) -> bool {
        self.last.is_none() && self.position == 0
    }
}

/// Linear resampler between two fixed rates.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    step_in: u64,
    step_out: u64,
    state: ResampleState,
}

impl LinearResampler {
    /// Create a resampler converting `from_rate` Hz to `to_rate` Hz.
    ///
    /// Zero rates are treated as 1 Hz.
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let from = from_rate.max(1) as u64;
        let to = to_rate.max(1) as u64;
        let divisor = gcd(from, to);
        Self {
            from_rate,
            to_rate,
            step_in: from / divisor,
            step_out: to / divisor,
            state: ResampleState::default(),
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    pub fn state(&self) -> ResampleState {
        self.state
    }

    /// Drop all filter memory.
    pub fn reset(&mut self) {
        self.state = ResampleState::default();
    }

    /// Convert `input`, appending produced samples to `output`.
    pub fn process(&mut self, input: &[i16], output: &mut Vec<i16>) {
        let Some(&tail) = input.last() else {
            return;
        };

        let history = self.state.last;
        let offset = usize::from(history.is_some());
        let window_len = input.len() + offset;
        let sample_at = |i: usize| -> i64 {
            match history {
                Some(prev) if i == 0 => prev as i64,
                _ => input[i - offset] as i64,
            }
        };

        output.reserve((input.len() as u64 * self.step_out / self.step_in) as usize + 1);

        let step_out = self.step_out;
        let mut position = self.state.position;
        loop {
            let index = (position / step_out) as usize;
            if index + 1 >= window_len {
                break;
            }
            let frac = (position % step_out) as i64;
            let a = sample_at(index);
            let b = sample_at(index + 1);
            output.push((a + (b - a) * frac / step_out as i64) as i16);
            position += self.step_in;
        }

        self.state = ResampleState {
            last: Some(tail),
            position: position - (window_len as u64 - 1) * step_out,
        };
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}
