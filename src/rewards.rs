//! Reward sink: where validated purchases turn into in-game items.

use crate::models::RewardDescriptor;

/// Applies rewards to the player's inventory.
pub trait RewardSink: Send + Sync {
    /// Grant `rewards`. `is_real_purchase` is false for entitlements replayed
    /// by a restore. Returns whether the grant was applied.
    fn grant(&self, rewards: &[RewardDescriptor], is_real_purchase: bool) -> bool;
}

/// Sink that only logs. Used by the CLI where there is no inventory to update.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRewardSink;

impl RewardSink for TracingRewardSink {
    fn grant(&self, rewards: &[RewardDescriptor], is_real_purchase: bool) -> bool {
        for reward in rewards {
            tracing::info!(
                "Granting reward: {} x{} ({}) from {} (real purchase: {})",
                reward.reward_id,
                reward.amount,
                reward.reward_type,
                reward.source_product_id,
                is_real_purchase
            );
        }
        true
    }
}
