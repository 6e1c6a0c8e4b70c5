use async_trait::async_trait;
use uuid::Uuid;

use super::{CurationStrategy, StrategyContext};
use crate::curation::error::CurationError;
use crate::models::script::StrategyKind;

/// Direct filtered query with the script's `sort` over its `timeframe`.
pub struct Standard;

#[async_trait]
impl CurationStrategy for Standard {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Standard
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let since = ctx
            .script
            .timeframe
            .and_then(|t| t.lookback())
            .map(|window| ctx.as_of - window);

        ctx.corpus
            .ranked(ctx.filter, ctx.script.sort, since, limit)
            .await
            .map_err(CurationError::corpus)
    }
}
