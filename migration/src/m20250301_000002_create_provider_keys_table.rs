use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderKeys::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::Provider)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::Label)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProviderKeys::Secret).text().not_null())
                    .col(
                        ColumnDef::new(ProviderKeys::SecretFingerprint)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::UnitsUsed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::UnitsLimit)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::ErrorCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ProviderKeys::LastError).text().null())
                    .col(ColumnDef::new(ProviderKeys::LastUsedAt).timestamp().null())
                    .col(
                        ColumnDef::new(ProviderKeys::RequestCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderKeys::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一服务商内密钥去重
        manager
            .create_index(
                Index::create()
                    .name("idx_provider_keys_unique_fingerprint")
                    .table(ProviderKeys::Table)
                    .col(ProviderKeys::Provider)
                    .col(ProviderKeys::SecretFingerprint)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_provider_keys_provider_active")
                    .table(ProviderKeys::Table)
                    .col(ProviderKeys::Provider)
                    .col(ProviderKeys::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderKeys {
    Table,
    Id,
    Provider,
    Label,
    Secret,
    SecretFingerprint,
    IsActive,
    UnitsUsed,
    UnitsLimit,
    ErrorCount,
    LastError,
    LastUsedAt,
    RequestCount,
    CreatedAt,
    UpdatedAt,
}
