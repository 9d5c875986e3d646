use crate::domain::ports::UnitOfWork;
use crate::error::Result;

/// Issues batch identifiers from inside the unit of work that consumes them.
///
/// The id is `max(batch_id) + 1` over both aggregates, read through the
/// caller's open unit. Units hold the store's writer lock, so two concurrent
/// batches can never observe the same maximum.
pub struct BatchAllocator;

impl BatchAllocator {
    pub async fn next_batch_id(unit: &dyn UnitOfWork) -> Result<u64> {
        Ok(unit.max_batch_id().await?.map_or(1, |max| max + 1))
    }
}
