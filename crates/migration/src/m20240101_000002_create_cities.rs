//! Create `cities` table. `state_id` points at `states.id` without a constraint.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Cities::Table)
                    .if_not_exists()
                    .col(string_len(Cities::Id, 60).primary_key())
                    .col(timestamp_with_time_zone(Cities::CreatedAt))
                    .col(timestamp_with_time_zone(Cities::UpdatedAt))
                    .col(string_len(Cities::Name, 128))
                    .col(string_len(Cities::StateId, 60))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Cities::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Cities { Table, Id, CreatedAt, UpdatedAt, Name, StateId }
