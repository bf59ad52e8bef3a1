//! Per-iteration performance records and convergence-rate histograms.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Instant;

/// One recorded iterate.
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub iteration: usize,
    pub elapsed_us: u64,
    pub residual: f64,
    pub flags: usize,
    pub ranks: Vec<usize>,
}

/// Collects per-iteration solver progress.
///
/// An inactive instance ignores every call, so solvers can take a
/// `&mut PerformanceData` unconditionally.
#[derive(Debug)]
pub struct PerformanceData {
    active: bool,
    pub print_progress: bool,
    additional_information: String,
    start: Option<Instant>,
    data: Vec<DataPoint>,
}

impl Default for PerformanceData {
    fn default() -> Self {
        Self {
            active: true,
            print_progress: false,
            additional_information: String::new(),
            start: None,
            data: Vec::new(),
        }
    }
}

impl PerformanceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// A no-op collector.
    pub fn inactive() -> Self {
        Self {
            active: false,
            ..Self::default()
        }
    }

    /// Reset the timer (implicitly called by the first `add`).
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
    }

    /// Free-form annotation written into the file header.
    pub fn set_annotation(&mut self, text: impl Into<String>) {
        self.additional_information = text.into();
    }

    pub fn data(&self) -> &[DataPoint] {
        &self.data
    }

    fn elapsed_us(&mut self) -> u64 {
        let start = *self.start.get_or_insert_with(Instant::now);
        start.elapsed().as_micros() as u64
    }

    /// Record one iterate, auto-incrementing the iteration count.
    pub fn add(&mut self, residual: f64, ranks: &[usize], flags: usize) {
        let iteration = self.data.last().map_or(0, |d| d.iteration + 1);
        self.add_at(iteration, residual, ranks, flags);
    }

    /// Record one iterate at an explicit iteration count.
    pub fn add_at(&mut self, iteration: usize, residual: f64, ranks: &[usize], flags: usize) {
        if !self.active {
            return;
        }
        let elapsed_us = self.elapsed_us();
        self.data.push(DataPoint {
            iteration,
            elapsed_us,
            residual,
            flags,
            ranks: ranks.to_vec(),
        });
        if self.print_progress {
            println!(
                "Iteration {:4} Time: {:.6}s Residual: {:e} Flags: {} Ranks: {:?}",
                iteration,
                elapsed_us as f64 * 1e-6,
                residual,
                flags,
                ranks
            );
        }
    }

    /// Write all data points as a tab-separated text file.
    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut header = String::from("# ");
        header.push_str(&self.additional_information.replace('\n', "\n# "));
        header.push_str("\n# \n#itr \ttime[us] \tresidual \tflags \tranks...\n");

        let mut out = String::new();
        out.push_str(&header);
        for d in &self.data {
            let _ = write!(
                out,
                "{}\t{}\t{}\t{}",
                d.iteration, d.elapsed_us, d.residual, d.flags
            );
            for r in &d.ranks {
                let _ = write!(out, "\t{r}");
            }
            out.push('\n');
        }
        std::fs::write(path, out)
    }

    /// Bucket the convergence rates observed between consecutive iterates.
    pub fn get_histogram(&self, base: f64) -> Histogram {
        Histogram::from_points(&self.data, base)
    }
}

/// Histogram of logarithmic convergence rates, bucketed by time spent.
///
/// Bucket `i` collects the residual-decay samples whose rate `r` satisfies
/// `base^i <= r < base^(i+1)`, weighted by the time the iteration took.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub base: f64,
    pub total_time: u64,
    pub buckets: BTreeMap<i64, u64>,
}

impl Histogram {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            total_time: 0,
            buckets: BTreeMap::new(),
        }
    }

    /// Assume `residual_2 = residual_1 * 2^(-rate * delta_t)` between
    /// consecutive points and bucket `log_base(rate)`.
    pub fn from_points(data: &[DataPoint], base: f64) -> Self {
        let mut result = Self::new(base);
        for pair in data.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if curr.residual >= prev.residual {
                continue;
            }
            let delta_t = curr.elapsed_us.saturating_sub(prev.elapsed_us);
            if delta_t == 0 {
                continue;
            }
            let relative_change = curr.residual / prev.residual;
            let exponent = relative_change.ln() / 2f64.ln();
            let rate = -exponent / delta_t as f64;
            let log_rate = (rate.ln() / base.ln()) as i64;
            *result.buckets.entry(log_rate).or_insert(0) += delta_t;
            result.total_time += delta_t;
        }
        result
    }

    /// Merge another histogram of the same base into this one.
    pub fn merge(&mut self, other: &Histogram) -> io::Result<()> {
        if (self.base - other.base).abs() > 1e-12 * self.base.abs() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "only histograms of identical base can be merged",
            ));
        }
        for (&idx, &count) in &other.buckets {
            *self.buckets.entry(idx).or_insert(0) += count;
        }
        self.total_time += other.total_time;
        Ok(())
    }

    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut out = io::BufWriter::new(file);
        writeln!(out, "# raw data:")?;
        writeln!(out, "# {} {}", self.base, self.total_time)?;
        write!(out, "#")?;
        for (idx, count) in &self.buckets {
            write!(out, " {idx} {count}")?;
        }
        writeln!(out)?;
        writeln!(out, "# plotable data:")?;
        if let (Some((&first, _)), Some((&last, _))) =
            (self.buckets.iter().next(), self.buckets.iter().next_back())
        {
            for i in first - 1..=last + 1 {
                let weight = self
                    .buckets
                    .get(&i)
                    .map_or(0.0, |&c| c as f64 / self.total_time as f64);
                if weight == 0.0 {
                    writeln!(out, "{} 0", self.base.powi(i as i32))?;
                } else {
                    writeln!(out, "{} {}", self.base.powi(i as i32), weight)?;
                }
            }
        }
        out.flush()
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut lines = io::BufReader::new(file).lines();

        let bad = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());

        let first = lines.next().ok_or_else(|| bad("empty histogram file"))??;
        if first != "# raw data:" {
            return Err(bad("unknown histogram file format"));
        }

        let meta = lines.next().ok_or_else(|| bad("missing histogram meta"))??;
        let mut parts = meta
            .strip_prefix('#')
            .ok_or_else(|| bad("missing meta marker"))?
            .split_whitespace();
        let base: f64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad("missing histogram base"))?;
        let total_time: u64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad("missing total time"))?;

        let bucket_line = lines.next().ok_or_else(|| bad("missing bucket data"))??;
        let bucket_body = bucket_line
            .strip_prefix('#')
            .ok_or_else(|| bad("missing bucket marker"))?;
        let mut result = Self::new(base);
        result.total_time = total_time;
        let mut tokens = bucket_body.split_whitespace();
        while let Some(idx) = tokens.next() {
            let idx: i64 = idx.parse().map_err(|_| bad("malformed bucket index"))?;
            let count: u64 = tokens
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| bad("missing bucket count"))?;
            result.buckets.insert(idx, count);
        }

        let accounted: u64 = result.buckets.values().sum();
        if accounted != result.total_time {
            return Err(bad("histogram data inconsistent"));
        }
        Ok(result)
    }
}
