//! Schema creation from entity definitions

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityName, EntityTrait, Schema};
use tracing::debug;

/// Create every table that does not exist yet. Safe to run on each start.
pub async fn ensure_schema(conn: &DatabaseConnection) -> Result<()> {
    create_table(conn, QuestionEntity).await?;
    create_table(conn, PaperEntity).await?;
    create_table(conn, PaperItemEntity).await?;
    create_table(conn, AnswerEntity).await?;
    create_table(conn, AnalysisResultEntity).await?;
    create_table(conn, ModelConfigEntity).await?;
    create_table(conn, PromptEntity).await?;
    create_table(conn, SpeechConfigEntity).await?;
    create_table(conn, SystemSettingEntity).await?;
    create_table(conn, ImportTaskEntity).await?;
    Ok(())
}

async fn create_table<E>(conn: &DatabaseConnection, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();

    conn.execute(backend.build(&stmt)).await?;
    debug!(table = entity.table_name(), "Ensured table");
    Ok(())
}
