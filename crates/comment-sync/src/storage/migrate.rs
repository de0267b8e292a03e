//! 账本数据库迁移与初始化 - 由 refinery 自动管理
//!
//! 统一入口 `init_db`：pragmas → migrate → 版本校验。
//! 新增迁移只需在 migrations/ 添加 V{n}__{name}.sql，编译期自动嵌入、自动执行。

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use rusqlite::Connection;

use crate::error::{Result, SyncError};
use crate::version::LEDGER_DB_VERSION;

/// refinery 使用的 migration 历史表名
const REFINERY_TABLE: &str = "refinery_schema_history";

/// 账本推荐 PRAGMA：WAL、FULL 同步（每次插入都要可靠落盘）
pub fn enable_pragmas(conn: &Connection) -> Result<()> {
    let pragmas = [("journal_mode", "WAL"), ("synchronous", "FULL"), ("temp_store", "MEMORY")];
    for (name, value) in pragmas {
        conn.pragma_update(None, name, value).map_err(|e| {
            SyncError::LedgerUnavailable(format!("设置 PRAGMA {} 失败: {}", name, e))
        })?;
    }
    Ok(())
}

/// 执行内置 migrations（编译期嵌入，按版本顺序执行）
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| SyncError::LedgerUnavailable(format!("执行 migration 失败: {}", e)))?;
    Ok(())
}

/// 读取当前数据库的 migration 版本；无表或空表返回 None
pub fn get_db_migration_version(conn: &Connection) -> Result<Option<i64>> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
        [REFINERY_TABLE],
        |row| row.get(0),
    ).map_err(|e| SyncError::LedgerUnavailable(format!("查询 {} 失败: {}", REFINERY_TABLE, e)))?;

    if !exists {
        return Ok(None);
    }

    let version: Option<i64> = conn.query_row(
        &format!("SELECT MAX(version) FROM {}", REFINERY_TABLE),
        [],
        |row| row.get::<_, Option<i64>>(0),
    ).map_err(|e| SyncError::LedgerUnavailable(format!("读取 migration 版本失败: {}", e)))?;

    Ok(version.filter(|&v| v > 0))
}

/// 若 DB 版本高于当前支持的最高版本，拒绝使用
fn check_db_version(conn: &Connection) -> Result<()> {
    let Some(v) = get_db_migration_version(conn)? else { return Ok(()); };
    if v > LEDGER_DB_VERSION {
        return Err(SyncError::LedgerUnavailable(format!(
            "账本数据库版本 {} 高于当前支持的最高版本 {}，请升级后再打开",
            v, LEDGER_DB_VERSION
        )));
    }
    Ok(())
}

/// 统一初始化入口
pub fn init_db(conn: &mut Connection) -> Result<()> {
    enable_pragmas(conn)?;
    run_migrations(conn)?;
    check_db_version(conn)?;
    Ok(())
}
