use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RotationSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RotationSettings::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RotationSettings::RotationEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RotationSettings::RotationIntervalMinutes)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(RotationSettings::MaxRequestsPerToken)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(
                        ColumnDef::new(RotationSettings::VideosPerBatch)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(RotationSettings::BatchDelaySeconds)
                            .integer()
                            .not_null()
                            .default(20),
                    )
                    .col(
                        ColumnDef::new(RotationSettings::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RotationSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RotationSettings {
    Table,
    Id,
    RotationEnabled,
    RotationIntervalMinutes,
    MaxRequestsPerToken,
    VideosPerBatch,
    BatchDelaySeconds,
    UpdatedAt,
}
