//! Known macOS releases.

/// Ordered `(major, minor)` pairs of macOS releases, oldest first.
///
/// A wheel tagged for an older release runs on every newer one, so the
/// platform matcher registers a macOS wheel under each release at or above
/// its declared minimum.
pub const MACOSX_VERSIONS: [(u32, u32); 13] = [
    (10, 9),  // Mavericks
    (10, 10), // Yosemite
    (10, 11), // El Capitan
    (10, 12), // Sierra
    (10, 13), // High Sierra
    (10, 14), // Mojave
    (10, 15), // Catalina
    (11, 0),  // Big Sur
    (12, 0),  // Monterey
    (13, 0),  // Ventura
    (14, 0),  // Sonoma
    (15, 0),  // Sequoia
    (16, 0),  // Tahoe
];
