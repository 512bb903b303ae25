//! Engine configuration.
//!
//! All options are plain fields with library defaults; the host wires them
//! from whatever configuration surface it owns. Declaration-order options
//! affect only formula compactness, never soundness, and are fixed at
//! engine construction.

/// Options recognized by the analysis engine.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Track variables classified as boolean-like.
    pub track_boolean: bool,
    /// Track variables used only in equality comparisons.
    pub track_int_equal: bool,
    /// Track variables used in general arithmetic.
    pub track_int_add: bool,
    /// Width used for numeric variables without a resolved type width.
    pub default_bitwidth: usize,
    /// Encode equality-only partitions with compressed codepoints instead of
    /// their full declared width.
    pub compress_int_equal: bool,
    /// Declaration order: all variables' bit 0, then all bit 1, ... when
    /// true; all bits of one variable, then the next, when false.
    pub bit_major_declaration: bool,
    /// Direction of bit indices inside the declaration order.
    pub bits_increasing: bool,
    /// Group the declaration order by the partition order computed by the
    /// `PartitionOrderer`.
    pub partition_ordered: bool,
    /// Capacity of the interleaved declaration id space: the maximum number
    /// of distinct variable positions.
    pub max_tracked_variables: usize,
    /// Capacity of the per-variable bit range in the declaration id space.
    pub max_bitwidth: usize,
    /// log2 of the region node-table capacity.
    pub storage_bits: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            track_boolean: true,
            track_int_equal: true,
            track_int_add: true,
            default_bitwidth: 32,
            compress_int_equal: false,
            bit_major_declaration: false,
            bits_increasing: true,
            partition_ordered: true,
            max_tracked_variables: 1 << 12,
            max_bitwidth: 64,
            storage_bits: 20,
        }
    }
}

impl AnalysisConfig {
    /// Capacity sanity check, done once at engine construction.
    pub fn validate(&self) {
        assert!(self.default_bitwidth > 0, "defaultBitwidth must be positive");
        assert!(
            self.default_bitwidth <= self.max_bitwidth,
            "defaultBitwidth exceeds the declaration id space"
        );
        assert!(self.max_tracked_variables > 0);
    }
}
