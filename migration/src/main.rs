use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    // 未设置 DATABASE_URL 时由 CLI 报错提示，避免误写默认数据库
    cli::run_cli(migration::Migrator).await;
}
