/*! Bounded-window running statistics.

A `StatStream` keeps the last `W` samples of a numeric series and maintains
their mean, sample variance, and median incrementally. Below the window
size it recomputes all three from scratch on every push (there's nothing to
amortize yet); once the window fills, `avg`/`var` use the incremental
update the original implementation used, reworked to dodge its `W == 1`
division-by-zero (variance is defined to be exactly `0` below two samples,
full stop, routed through the from-scratch path rather than the
incremental one).
*/

use std::collections::VecDeque;

/// EMA gain applied to link-latency samples before they enter a `StatStream`.
pub const LINK_LAT_EMA_GAIN: f64 = 0.125;

pub struct StatStream {
    window: usize,
    samples: VecDeque<f64>,
    avg: f64,
    var: f64,
    med: f64,
    /// `Some(srtt)` for link-latency streams, which pre-filter every sample
    /// through an exponential moving average before it's pushed.
    ema: Option<f64>,
}

impl StatStream {
    pub fn new(window: usize) -> StatStream {
        assert!(window > 0, "window size must be positive");
        StatStream {
            window,
            samples: VecDeque::with_capacity(window),
            avg: 0.0,
            var: 0.0,
            med: 0.0,
            ema: None,
        }
    }

    /// A stream that smooths every sample through an EMA (gain
    /// [`LINK_LAT_EMA_GAIN`], initial state `0.0`) before folding it into
    /// the window statistics. Used for link latency: the raw sample is a
    /// difference of two noisy RTT estimates and often lands at or below
    /// zero, so the EMA pulls it toward a non-zero smoothed track first.
    pub fn new_ema(window: usize) -> StatStream {
        let mut s = StatStream::new(window);
        s.ema = Some(0.0);
        s
    }

    /// Pushes a sample (running it through the EMA pre-filter first, if
    /// configured) and returns the value that was actually folded into the
    /// window statistics.
    pub fn push(&mut self, sample: f64) -> f64 {
        let value = match &mut self.ema {
            Some(srtt) => {
                *srtt += LINK_LAT_EMA_GAIN * (sample - *srtt);
                *srtt
            }
            None => sample,
        };
        self.push_windowed(value);
        value
    }

    fn push_windowed(&mut self, new: f64) {
        if self.samples.len() < self.window {
            self.samples.push_back(new);
            self.recompute_from_scratch();
            return;
        }

        let old = self.samples.pop_front().unwrap();
        self.samples.push_back(new);

        if self.samples.len() < 2 {
            self.avg = new;
            self.var = 0.0;
        } else {
            let mu = self.avg;
            let new_avg = mu + (new - old) / self.window as f64;
            self.var += (new - old) * (new - new_avg + old - mu) / (self.window as f64 - 1.0);
            self.avg = new_avg;
        }
        self.med = median(&self.samples);
    }

    fn recompute_from_scratch(&mut self) {
        let n = self.samples.len();
        let sum: f64 = self.samples.iter().sum();
        self.avg = sum / n as f64;
        self.var = if n < 2 {
            0.0
        } else {
            let ss: f64 = self.samples.iter().map(|x| (x - self.avg).powi(2)).sum();
            ss / (n as f64 - 1.0)
        };
        self.med = median(&self.samples);
    }

    pub fn avg(&self) -> f64 {
        self.avg
    }

    pub fn var(&self) -> f64 {
        self.var
    }

    pub fn med(&self) -> f64 {
        self.med
    }

    pub fn srtt(&self) -> Option<f64> {
        self.ema
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn median(samples: &VecDeque<f64>) -> f64 {
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("NaN must not be pushed"));
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
