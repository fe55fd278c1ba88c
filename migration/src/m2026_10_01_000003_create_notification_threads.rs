//! Migration to create the notification_threads table.
//!
//! A thread links one product URL to the open conversation on one
//! notification channel. At most one thread exists per (channel, product_url).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotificationThreads::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotificationThreads::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotificationThreads::Channel).text().not_null())
                    .col(
                        ColumnDef::new(NotificationThreads::ProductUrl)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationThreads::ExternalMessageId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotificationThreads::LastExternalMessageId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotificationThreads::ContentHash)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotificationThreads::Counter)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(NotificationThreads::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotificationThreads::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_threads_channel_product_url")
                    .table(NotificationThreads::Table)
                    .col(NotificationThreads::Channel)
                    .col(NotificationThreads::ProductUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_threads_channel_content_hash")
                    .table(NotificationThreads::Table)
                    .col(NotificationThreads::Channel)
                    .col(NotificationThreads::ContentHash)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_notification_threads_channel_product_url")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_notification_threads_channel_content_hash")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(NotificationThreads::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotificationThreads {
    Table,
    Id,
    Channel,
    ProductUrl,
    ExternalMessageId,
    LastExternalMessageId,
    ContentHash,
    Counter,
    CreatedAt,
    UpdatedAt,
}
