#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub packets_stale: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
}

impl NetworkStats {
    pub fn packet_loss_percent(&self) -> f32 {
        let expected = self.packets_received + self.packets_lost;
        if expected == 0 {
            return 0.0;
        }
        self.packets_lost as f32 / expected as f32 * 100.0
    }

    /// Smoothed RTT, same weighting as a TCP estimator.
    pub fn record_rtt(&mut self, rtt_ms: f32) {
        const ALPHA: f32 = 0.125;

        if self.rtt_ms <= 0.0 {
            self.rtt_ms = rtt_ms;
        } else {
            self.rtt_ms = (1.0 - ALPHA) * self.rtt_ms + ALPHA * rtt_ms;
        }
    }
}

pub fn unix_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_percent() {
        let stats = NetworkStats {
            packets_received: 90,
            packets_lost: 10,
            ..Default::default()
        };

        assert!((stats.packet_loss_percent() - 10.0).abs() < 0.001);
        assert_eq!(NetworkStats::default().packet_loss_percent(), 0.0);
    }

    #[test]
    fn test_rtt_smoothing() {
        let mut stats = NetworkStats::default();

        stats.record_rtt(100.0);
        assert_eq!(stats.rtt_ms, 100.0);

        stats.record_rtt(200.0);
        assert!((stats.rtt_ms - 112.5).abs() < 0.001);
    }
}
