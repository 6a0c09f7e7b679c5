//! Per-tool call statistics

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Counters for one tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolUsage {
    pub tool_name: String,
    pub call_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_used: DateTime<Utc>,
    /// Running mean in milliseconds
    pub avg_execution_ms: f64,
}

/// Aggregate across all tools
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_calls: u64,
    pub total_success: u64,
    pub total_errors: u64,
    /// 0 when nothing was called yet
    pub success_rate: f64,
    pub most_used_tool: Option<String>,
}

/// Thread-safe tool usage recorder
#[derive(Debug, Default)]
pub struct ToolStats {
    usage: RwLock<HashMap<String, ToolUsage>>,
}

impl ToolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call outcome
    pub fn record(&self, tool: &str, success: bool, execution_ms: u64) {
        let mut usage = self.usage.write();
        let entry = usage.entry(tool.to_string()).or_insert_with(|| ToolUsage {
            tool_name: tool.to_string(),
            call_count: 0,
            success_count: 0,
            error_count: 0,
            last_used: Utc::now(),
            avg_execution_ms: 0.0,
        });

        entry.call_count += 1;
        entry.last_used = Utc::now();
        if success {
            entry.success_count += 1;
        } else {
            entry.error_count += 1;
        }
        let n = entry.call_count as f64;
        entry.avg_execution_ms += (execution_ms as f64 - entry.avg_execution_ms) / n;
    }

    /// Usage for one tool, or every tool sorted by name
    pub fn usage(&self, tool: Option<&str>) -> Vec<ToolUsage> {
        let usage = self.usage.read();
        match tool {
            Some(name) => usage.get(name).cloned().into_iter().collect(),
            None => {
                let mut all: Vec<ToolUsage> = usage.values().cloned().collect();
                all.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
                all
            }
        }
    }

    pub fn summary(&self) -> StatsSummary {
        let usage = self.usage.read();
        let total_calls: u64 = usage.values().map(|u| u.call_count).sum();
        let total_success: u64 = usage.values().map(|u| u.success_count).sum();
        let total_errors: u64 = usage.values().map(|u| u.error_count).sum();

        // Ties resolve to the alphabetically first tool
        let most_used_tool = usage
            .values()
            .max_by(|a, b| {
                a.call_count
                    .cmp(&b.call_count)
                    .then_with(|| b.tool_name.cmp(&a.tool_name))
            })
            .map(|u| u.tool_name.clone());

        StatsSummary {
            total_calls,
            total_success,
            total_errors,
            success_rate: if total_calls > 0 {
                total_success as f64 / total_calls as f64
            } else {
                0.0
            },
            most_used_tool,
        }
    }

    pub fn reset(&self) {
        self.usage.write().clear();
    }
}
