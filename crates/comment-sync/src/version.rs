//! 版本与运行时元信息
//!
//! - **Crate Version** → Cargo.toml
//! - **Ledger Migration Version** → migrations 文件（由 refinery 自动管理）

/// crate semver，来自 Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// build time（由 vergen 在 build.rs 中生成）
pub const BUILD_TIME: &str = env!("VERGEN_BUILD_TIMESTAMP");

/// 当前支持的最高账本 migration 版本（refinery_schema_history 的 version）。
/// 由 build.rs 扫描 migrations/ 下 V{version}__*.sql 取最大值生成。
/// 若磁盘上的账本版本更高则拒绝打开（防 downgrade 导致 schema 不兼容）。
pub const LEDGER_DB_VERSION: i64 = parse_db_version(env!("LEDGER_DB_VERSION"));

/// 编译期解析版本号字符串为 i64（build.rs 只会输出纯数字）
const fn parse_db_version(s: &str) -> i64 {
    let b = s.as_bytes();
    let mut v = 0i64;
    let mut i = 0usize;
    while i < b.len() {
        if b[i] >= b'0' && b[i] <= b'9' {
            v = v * 10 + (b[i] - b'0') as i64;
        }
        i += 1;
    }
    v
}

/// 启动日志用的版本摘要
pub fn version_line() -> String {
    format!("comment-sync {} (built {}, ledger schema v{})", VERSION, BUILD_TIME, LEDGER_DB_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_db_version() {
        assert_eq!(parse_db_version("1"), 1);
        assert_eq!(parse_db_version("12"), 12);
        assert_eq!(parse_db_version(""), 0);
    }

    #[test]
    fn test_ledger_version_matches_migrations() {
        assert!(LEDGER_DB_VERSION >= 1);
    }
}
