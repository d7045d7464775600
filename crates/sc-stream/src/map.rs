//! Source-key to channel mapping for multichannel interleaved files

/// Channel mapping rules for multichannel mode
#[derive(Debug, Clone, Copy)]
pub struct MultichannelMap {
    /// 0-based channel carrying the LFE bed (ADM convention puts it at 3)
    pub lfe_channel: usize,
}

impl Default for MultichannelMap {
    fn default() -> Self {
        Self { lfe_channel: 3 }
    }
}

impl MultichannelMap {
    /// Resolve a source key to a 0-based channel index.
    ///
    /// Keys of the form `"N.M"` (e.g. `"11.1"`) map to channel `N-1`;
    /// `"LFE"` and any source flagged LFE map to `lfe_channel`. Returns
    /// None for keys that fit neither shape.
    pub fn channel_for(&self, key: &str, is_lfe: bool) -> Option<usize> {
        if is_lfe || key.eq_ignore_ascii_case("lfe") {
            return Some(self.lfe_channel);
        }
        let leading = key.split('.').next()?;
        let n: usize = leading.parse().ok()?;
        if n == 0 {
            return None;
        }
        Some(n - 1)
    }
}
