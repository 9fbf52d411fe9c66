//! Subscription configuration
//!
//! [`SubscriptionInfo`] describes what and how to subscribe; it is
//! serialized into the semicolon-delimited connection string carried by the
//! `Subscribe` command.

use std::fmt::Write;

const ASSEMBLY_SOURCE: &str = "GepSubscriptionLibrary";
const ASSEMBLY_VERSION: &str = env!("CARGO_PKG_VERSION");
const ASSEMBLY_BUILD_DATE: &str = "2026-06-30";

/// Configuration for one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    /// Filter expression selecting the input measurements; passed to the
    /// publisher as an opaque string.
    pub filter_expression: String,

    /// Request frame-level timestamps from a remotely synchronized publisher.
    pub remotely_synchronized: bool,
    /// Track only the latest measurement per signal.
    pub throttled: bool,

    /// Receive data packets over a local UDP port instead of the TCP
    /// command channel.
    pub udp_data_channel: bool,
    pub data_channel_local_port: u16,

    /// Include per-measurement timestamps in the stream.
    pub include_time: bool,
    pub lag_time: f64,
    pub lead_time: f64,
    pub use_local_clock_as_real_time: bool,
    /// Truncate base-time offsets to millisecond resolution.
    pub use_millisecond_resolution: bool,

    /// Temporal replay bounds; empty for a real-time session.
    pub start_time: String,
    pub stop_time: String,
    pub constraint_parameters: String,
    /// -1 = default, 0 = as fast as possible, otherwise milliseconds.
    pub processing_interval: i32,

    /// Additional key=value pairs appended verbatim.
    pub extra_connection_string_parameters: String,
}

impl Default for SubscriptionInfo {
    fn default() -> Self {
        Self {
            filter_expression: String::new(),
            remotely_synchronized: false,
            throttled: false,
            udp_data_channel: false,
            data_channel_local_port: 9500,
            include_time: true,
            lag_time: 10.0,
            lead_time: 5.0,
            use_local_clock_as_real_time: false,
            use_millisecond_resolution: false,
            start_time: String::new(),
            stop_time: String::new(),
            constraint_parameters: String::new(),
            processing_interval: -1,
            extra_connection_string_parameters: String::new(),
        }
    }
}

impl SubscriptionInfo {
    /// Builds the semicolon-delimited connection string for the `Subscribe`
    /// command.
    pub(crate) fn to_connection_string(&self) -> String {
        let mut s = String::new();

        let _ = write!(
            s,
            "trackLatestMeasurements={};",
            u8::from(self.throttled)
        );
        let _ = write!(s, "includeTime={};", u8::from(self.include_time));
        let _ = write!(s, "lagTime={};", self.lag_time);
        let _ = write!(s, "leadTime={};", self.lead_time);
        let _ = write!(
            s,
            "useLocalClockAsRealTime={};",
            u8::from(self.use_local_clock_as_real_time)
        );
        let _ = write!(s, "processingInterval={};", self.processing_interval);
        let _ = write!(
            s,
            "useMillisecondResolution={};",
            u8::from(self.use_millisecond_resolution)
        );
        let _ = write!(
            s,
            "assemblyInfo={{source={ASSEMBLY_SOURCE}; version={ASSEMBLY_VERSION}; buildDate={ASSEMBLY_BUILD_DATE}}};"
        );

        if !self.filter_expression.is_empty() {
            let _ = write!(s, "inputMeasurementKeys={{{}}};", self.filter_expression);
        }

        if self.udp_data_channel {
            let _ = write!(
                s,
                "dataChannel={{localport={}}};",
                self.data_channel_local_port
            );
        }

        if !self.start_time.is_empty() {
            let _ = write!(s, "startTimeConstraint={};", self.start_time);
        }
        if !self.stop_time.is_empty() {
            let _ = write!(s, "stopTimeConstraint={};", self.stop_time);
        }
        if !self.constraint_parameters.is_empty() {
            let _ = write!(s, "timeConstraintParameters={};", self.constraint_parameters);
        }
        if !self.extra_connection_string_parameters.is_empty() {
            let _ = write!(s, "{};", self.extra_connection_string_parameters);
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let info = SubscriptionInfo::default();
        assert_eq!(info.data_channel_local_port, 9500);
        assert!(info.include_time);
        assert_eq!(info.lag_time, 10.0);
        assert_eq!(info.lead_time, 5.0);
        assert_eq!(info.processing_interval, -1);
        assert!(!info.udp_data_channel);
    }

    #[test]
    fn test_connection_string_defaults() {
        let s = SubscriptionInfo::default().to_connection_string();
        assert!(s.starts_with("trackLatestMeasurements=0;"));
        assert!(s.contains("includeTime=1;"));
        assert!(s.contains("lagTime=10;"));
        assert!(s.contains("leadTime=5;"));
        assert!(s.contains("processingInterval=-1;"));
        assert!(s.contains("useMillisecondResolution=0;"));
        assert!(s.contains("assemblyInfo={source=GepSubscriptionLibrary;"));
        // Optional keys are absent by default
        assert!(!s.contains("inputMeasurementKeys"));
        assert!(!s.contains("dataChannel"));
        assert!(!s.contains("startTimeConstraint"));
    }

    #[test]
    fn test_connection_string_udp_channel() {
        let info = SubscriptionInfo {
            udp_data_channel: true,
            data_channel_local_port: 9500,
            ..Default::default()
        };
        assert!(info
            .to_connection_string()
            .contains("dataChannel={localport=9500};"));
    }

    #[test]
    fn test_connection_string_filter_and_temporal() {
        let info = SubscriptionInfo {
            filter_expression: "PPA:1;PPA:2".to_string(),
            start_time: "2026-01-01 00:00:00".to_string(),
            stop_time: "2026-01-01 01:00:00".to_string(),
            constraint_parameters: "historian=local".to_string(),
            extra_connection_string_parameters: "bufferSize=16".to_string(),
            ..Default::default()
        };
        let s = info.to_connection_string();
        assert!(s.contains("inputMeasurementKeys={PPA:1;PPA:2};"));
        assert!(s.contains("startTimeConstraint=2026-01-01 00:00:00;"));
        assert!(s.contains("stopTimeConstraint=2026-01-01 01:00:00;"));
        assert!(s.contains("timeConstraintParameters=historian=local;"));
        assert!(s.ends_with("bufferSize=16;"));
    }
}
