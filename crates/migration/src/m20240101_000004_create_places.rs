//! Create `places` table with owner (`user_id`) and location (`city_id`) columns.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Places::Table)
                    .if_not_exists()
                    .col(string_len(Places::Id, 60).primary_key())
                    .col(timestamp_with_time_zone(Places::CreatedAt))
                    .col(timestamp_with_time_zone(Places::UpdatedAt))
                    .col(string_len(Places::CityId, 60))
                    .col(string_len(Places::UserId, 60))
                    .col(string_len(Places::Name, 128))
                    .col(string_len_null(Places::Description, 1024))
                    .col(integer(Places::NumberRooms).default(0))
                    .col(integer(Places::NumberBathrooms).default(0))
                    .col(integer(Places::MaxGuest).default(0))
                    .col(integer(Places::PriceByNight).default(0))
                    .col(double_null(Places::Latitude))
                    .col(double_null(Places::Longitude))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Places::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Places {
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    CityId,
    UserId,
    Name,
    Description,
    NumberRooms,
    NumberBathrooms,
    MaxGuest,
    PriceByNight,
    Latitude,
    Longitude,
}
