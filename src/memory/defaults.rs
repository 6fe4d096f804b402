//! Default sizes and names.
//!
//! # Pool bound
//!
//! A pool descriptor length travels as a signed 32-bit value, so in theory a
//! backing file could grow to 2 GiB since it is never mapped in full on our
//! side. The display peer is a different matter: it maps the whole descriptor
//! range and keeps that mapping for as long as buffers reference it, and every
//! client window multiplies that address space. 256 MiB is a conservative
//! middle ground. On 32-bit targets the address space is too small for this
//! and scrolling is disabled altogether.

// =============================================================================
// Sizes (bytes)
// =============================================================================

/// Maximum `offset + size` inside one backing file (256 MiB).
pub const MAX_POOL_SIZE: usize = 256 * 1024 * 1024;

/// Page size assumed when the kernel reports none.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

// =============================================================================
// Names
// =============================================================================

/// memfd name for buffer backing files.
pub const BACKING_NAME: &str = "shmbuf-buffer-pool";

/// memfd name for the one-off hole punching probe.
pub const PROBE_NAME: &str = "shmbuf-punch-hole-probe";
