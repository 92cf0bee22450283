//! HTTP/2 fingerprint configuration (SETTINGS frame).
//!
//! The pooled transport applies these values so the HTTP/2 connection
//! preface matches the browser whose ClientHello opened the connection.

use crate::profile::BrowserFamily;

/// HTTP/2 SETTINGS and flow-control values for one browser family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Http2Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: u32,
    /// Connection-level window announced through WINDOW_UPDATE.
    pub initial_connection_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: Option<u32>,
}

impl Default for Http2Settings {
    fn default() -> Self {
        Self::chrome()
    }
}

impl Http2Settings {
    /// Chromium (Chrome and Edge).
    pub fn chrome() -> Self {
        Self {
            header_table_size: 65536,
            enable_push: false,
            max_concurrent_streams: Some(1000),
            initial_window_size: 6_291_456,
            initial_connection_window_size: 15_728_640 + 65_535,
            max_frame_size: 16384,
            max_header_list_size: Some(262_144),
        }
    }

    pub fn firefox() -> Self {
        Self {
            header_table_size: 65536,
            enable_push: false,
            max_concurrent_streams: None,
            initial_window_size: 131_072,
            initial_connection_window_size: 12_517_377 + 65_535,
            max_frame_size: 16384,
            max_header_list_size: None,
        }
    }

    pub fn safari() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: false,
            max_concurrent_streams: Some(100),
            initial_window_size: 2_097_152,
            initial_connection_window_size: 10_485_760 + 65_535,
            max_frame_size: 16384,
            max_header_list_size: None,
        }
    }

    pub fn for_family(family: BrowserFamily) -> Self {
        match family {
            BrowserFamily::Chrome | BrowserFamily::Edge => Self::chrome(),
            BrowserFamily::Firefox => Self::firefox(),
            BrowserFamily::Safari => Self::safari(),
        }
    }
}
