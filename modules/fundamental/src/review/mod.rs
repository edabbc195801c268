pub mod endpoints;

use crate::Error;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use uuid::Uuid;
use vulndash_common::{
    db::Database,
    model::{Paginated, PaginatedResults},
};
use vulndash_entity::review_queue_item::{self, Decision};

/// Read side of the review queue. Decisions go through the ingest service,
/// which owns promotion.
#[derive(Clone)]
pub struct ReviewQueueService {
    db: Database,
}

impl ReviewQueueService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        decision: Option<Decision>,
        paginated: Paginated,
    ) -> Result<PaginatedResults<review_queue_item::Model>, Error> {
        let paginated = paginated.clamped();

        let mut query = review_queue_item::Entity::find();
        if let Some(decision) = decision {
            query = query.filter(review_queue_item::Column::Decision.eq(decision));
        }

        let total = query.clone().count(&*self.db).await?;
        let items = query
            .order_by_desc(review_queue_item::Column::CreatedAt)
            .offset(paginated.offset)
            .limit(paginated.limit)
            .all(&*self.db)
            .await?;

        Ok(PaginatedResults { items, total })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<review_queue_item::Model>, Error> {
        Ok(review_queue_item::Entity::find_by_id(id)
            .one(&*self.db)
            .await?)
    }
}
