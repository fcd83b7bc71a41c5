//! Single-sample container stats decoding
//!
//! Mirrors `docker stats --no-stream`'s arithmetic over a single JSON
//! sample from the daemon.

use bollard::container::Stats;

/// A decoded single-sample resource snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContainerStatsSummary {
    /// CPU usage percentage across all online CPUs.
    pub cpu_percent: f64,
    /// Memory in use, excluding page cache, in bytes.
    pub mem_usage: u64,
    /// Memory limit in bytes.
    pub mem_limit: u64,
    /// Total received bytes across all network interfaces.
    pub net_rx_bytes: u64,
    /// Total transmitted bytes across all network interfaces.
    pub net_tx_bytes: u64,
    /// Total bytes read from block devices.
    pub blk_read_bytes: u64,
    /// Total bytes written to block devices.
    pub blk_write_bytes: u64,
    /// Current process count.
    pub pids: u64,
}

/// Decode a single [`Stats`] sample into a [`ContainerStatsSummary`].
pub fn summarize(stats: &Stats) -> ContainerStatsSummary {
    ContainerStatsSummary {
        cpu_percent: cpu_percent(stats),
        mem_usage: mem_usage(stats),
        mem_limit: stats.memory_stats.limit.unwrap_or(0),
        net_rx_bytes: net_total(stats, |n| n.rx_bytes),
        net_tx_bytes: net_total(stats, |n| n.tx_bytes),
        blk_read_bytes: blkio_total(stats, "read"),
        blk_write_bytes: blkio_total(stats, "write"),
        pids: stats.pids_stats.current.unwrap_or(0),
    }
}

fn cpu_percent(stats: &Stats) -> f64 {
    let cpu_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage) as f64;
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .unwrap_or(0)
        .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0)) as f64;

    if system_delta <= 0.0 || cpu_delta <= 0.0 {
        return 0.0;
    }

    let online_cpus = stats.cpu_stats.online_cpus.filter(|c| *c > 0).unwrap_or_else(|| {
        stats
            .cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len() as u64)
            .unwrap_or(1)
    });

    (cpu_delta / system_delta) * online_cpus as f64 * 100.0
}

fn mem_usage(stats: &Stats) -> u64 {
    let usage = stats.memory_stats.usage.unwrap_or(0);
    let cache = stats
        .memory_stats
        .stats
        .as_ref()
        .and_then(|s| s.get("cache"))
        .copied()
        .unwrap_or(0);
    usage.saturating_sub(cache)
}

fn net_total(stats: &Stats, field: impl Fn(&bollard::container::NetworkStats) -> u64) -> u64 {
    stats
        .networks
        .as_ref()
        .map(|nets| nets.values().map(&field).sum())
        .unwrap_or(0)
}

fn blkio_total(stats: &Stats, op: &str) -> u64 {
    stats
        .blkio_stats
        .io_service_bytes_recursive
        .as_ref()
        .map(|entries| {
            entries
                .iter()
                .filter(|e| e.op.eq_ignore_ascii_case(op))
                .map(|e| e.value)
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::container::{BlkioStats, BlkioStatsEntry, CpuStats, CpuUsage, MemoryStats, NetworkStats, PidsStats, Stats};
    use std::collections::HashMap;

    fn empty_stats() -> Stats {
        Stats {
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 0,
                    percpu_usage: None,
                    usage_in_kernelmode: 0,
                    usage_in_usermode: 0,
                },
                system_cpu_usage: Some(0),
                online_cpus: Some(0),
                throttling_data: Default::default(),
            },
            precpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 0,
                    percpu_usage: None,
                    usage_in_kernelmode: 0,
                    usage_in_usermode: 0,
                },
                system_cpu_usage: Some(0),
                online_cpus: Some(0),
                throttling_data: Default::default(),
            },
            memory_stats: MemoryStats {
                usage: Some(0),
                max_usage: None,
                stats: None,
                limit: Some(0),
                ..Default::default()
            },
            blkio_stats: BlkioStats {
                io_service_bytes_recursive: None,
                ..Default::default()
            },
            pids_stats: PidsStats {
                current: Some(1),
                limit: None,
            },
            networks: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_percent_zero_system_delta_is_zero() {
        let stats = empty_stats();
        assert_eq!(cpu_percent(&stats), 0.0);
    }

    #[test]
    fn test_cpu_percent_uses_percpu_len_when_online_cpus_zero() {
        let mut stats = empty_stats();
        stats.cpu_stats.cpu_usage.total_usage = 200;
        stats.cpu_stats.system_cpu_usage = Some(1000);
        stats.cpu_stats.online_cpus = Some(0);
        stats.cpu_stats.cpu_usage.percpu_usage = Some(vec![0, 0]);
        stats.precpu_stats.cpu_usage.total_usage = 100;
        stats.precpu_stats.system_cpu_usage = Some(500);

        // cpu_delta = 100, system_delta = 500, online = 2 -> (100/500)*2*100 = 40
        assert_eq!(cpu_percent(&stats), 40.0);
    }

    #[test]
    fn test_mem_usage_subtracts_cache() {
        let mut stats = empty_stats();
        stats.memory_stats.usage = Some(1000);
        let mut cache_map = HashMap::new();
        cache_map.insert("cache".to_string(), 200);
        stats.memory_stats.stats = Some(cache_map);

        assert_eq!(mem_usage(&stats), 800);
    }

    #[test]
    fn test_blkio_sums_by_op_case_insensitive() {
        let mut stats = empty_stats();
        stats.blkio_stats.io_service_bytes_recursive = Some(vec![
            BlkioStatsEntry {
                major: 8,
                minor: 0,
                op: "Read".to_string(),
                value: 10,
            },
            BlkioStatsEntry {
                major: 8,
                minor: 0,
                op: "Write".to_string(),
                value: 20,
            },
            BlkioStatsEntry {
                major: 8,
                minor: 0,
                op: "read".to_string(),
                value: 5,
            },
        ]);

        assert_eq!(blkio_total(&stats, "read"), 15);
        assert_eq!(blkio_total(&stats, "write"), 20);
    }

    #[test]
    fn test_net_totals_sum_across_interfaces() {
        let mut stats = empty_stats();
        let mut nets = HashMap::new();
        nets.insert(
            "eth0".to_string(),
            NetworkStats {
                rx_bytes: 100,
                tx_bytes: 50,
                ..Default::default()
            },
        );
        nets.insert(
            "eth1".to_string(),
            NetworkStats {
                rx_bytes: 10,
                tx_bytes: 5,
                ..Default::default()
            },
        );
        stats.networks = Some(nets);

        assert_eq!(net_total(&stats, |n| n.rx_bytes), 110);
        assert_eq!(net_total(&stats, |n| n.tx_bytes), 55);
    }
}
