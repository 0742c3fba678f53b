//! Coordinator report
use std::fmt;

use crate::timing::Timings;

/// Summary of one run as printed by the coordinator
#[derive(Debug, Clone)]
pub struct Report {
    /// Number of workers
    pub workers: usize,
    /// Threads per worker
    pub threads: usize,
    /// Global array size
    pub n: usize,
    /// K, for top-K runs
    pub k: Option<usize>,
    /// Verification outcome when verification ran
    pub verified: Option<bool>,
    /// Coordinator timings
    pub timings: Timings,
}

impl Report {
    /// The machine-readable summary: `CSV: P,T,N[,K],total,compute,communication`
    pub fn csv_line(&self) -> String {
        let k = self.k.map(|k| format!("{k},")).unwrap_or_default();
        format!(
            "CSV: {},{},{},{}{:.6},{:.6},{:.6}",
            self.workers,
            self.threads,
            self.n,
            k,
            self.timings.total.as_secs_f64(),
            self.timings.compute.as_secs_f64(),
            self.timings.communication.as_secs_f64()
        )
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.k.is_some() {
            "Distributed top-K"
        } else {
            "Distributed bucket sort"
        };
        writeln!(f, "=== {title} ===")?;
        writeln!(f, "Workers: {}", self.workers)?;
        writeln!(f, "Threads per worker: {}", self.threads)?;
        writeln!(f, "Total threads: {}", self.workers * self.threads)?;
        writeln!(f, "Array size: {}", self.n)?;
        if let Some(k) = self.k {
            writeln!(f, "K: {k}")?;
        }
        match self.verified {
            Some(verified) => writeln!(f, "Correct: {}", yes_no(verified))?,
            None => writeln!(f, "Correct: not checked")?,
        }

        let t = &self.timings;
        writeln!(f, "Total time: {:.6} s", t.total.as_secs_f64())?;
        writeln!(
            f,
            "Compute time: {:.6} s ({:.1}%)",
            t.compute.as_secs_f64(),
            100.0 * t.compute_share()
        )?;
        writeln!(
            f,
            "Communication time: {:.6} s ({:.1}%)",
            t.communication.as_secs_f64(),
            100.0 * t.communication_share()
        )?;
        if self.k.is_none() && !t.total.is_zero() {
            writeln!(
                f,
                "Throughput: {:.2} million keys/s",
                self.n as f64 / t.total.as_secs_f64() / 1e6
            )?;
        }
        write!(f, "{}", self.csv_line())
    }
}
