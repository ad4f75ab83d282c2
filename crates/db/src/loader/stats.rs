//! Per-loader resolution counters.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

/// Counters gathered by one `exec` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Keys resolved to an id, whether found or created.
    pub total: usize,
    /// Keys for which this loader created the row.
    pub inserted: usize,
}

impl AddAssign for LoaderStats {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.inserted += other.inserted;
    }
}

impl fmt::Display for LoaderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total={} inserted={}", self.total, self.inserted)
    }
}

/// A loader whose counters can be reported without knowing its key type.
pub trait LoaderReport {
    fn name(&self) -> &'static str;
    fn stats(&self) -> LoaderStats;
}

/// Flattens loader counters into `"<name>.total"` and `"<name>.inserted"`
/// entries. Loaders sharing a name are summed.
pub fn collect_stats(loaders: &[&dyn LoaderReport]) -> BTreeMap<String, usize> {
    let mut by_name: BTreeMap<&'static str, LoaderStats> = BTreeMap::new();
    for loader in loaders {
        *by_name.entry(loader.name()).or_default() += loader.stats();
    }

    let mut out = BTreeMap::new();
    for (name, stats) in by_name {
        out.insert(format!("{}.total", name), stats.total);
        out.insert(format!("{}.inserted", name), stats.inserted);
    }
    out
}
