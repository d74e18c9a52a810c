//! Change computation: the two-pass fee fixpoint and the greedy packing of
//! multi-asset change under the per-output value-size ceiling.

use pallas::ledger::addresses::Address;
use tracing::debug;

use super::fee::{fee, max_tx_fee, min_lovelace};
use super::{TransactionBuilder, TxBuilderError};
use crate::context::ChainContext;
use crate::primitives::{Asset, AssetName, ExUnits, MultiAsset, Output, PolicyId, Value};

impl<C: ChainContext> TransactionBuilder<'_, C> {
    /// Two passes: first compute change against the largest fee any
    /// transaction could be charged, then measure the fully witnessed
    /// transaction that results, charge the exact fee for that size and
    /// recompute change against it.
    ///
    /// Serialized size is monotone in the fee (a larger coin never encodes
    /// shorter), so the second transaction cannot outgrow the first and a
    /// single re-fit suffices.
    pub(crate) fn add_change_and_fee(
        &mut self,
        change_address: Option<&Address>,
    ) -> Result<(), TxBuilderError> {
        let original_outputs = self.outputs.clone();

        if let Some(address) = change_address {
            self.fee = max_tx_fee(self.context.protocol_param());
            let changes = self.calc_change(self.fee, address, false)?;
            self.outputs.extend(changes);
        }

        let mut plutus_execution_units = ExUnits::default();
        for redeemer in &self.redeemers {
            plutus_execution_units += redeemer.ex_units;
        }

        let fake_tx = self.build_full_fake_tx()?;
        self.fee = fee(
            self.context.protocol_param(),
            fake_tx.bytes.len() as u64,
            plutus_execution_units.steps,
            plutus_execution_units.mem,
        );
        debug!(fee = self.fee, tx_size = fake_tx.bytes.len(), "fitted exact fee");

        if let Some(address) = change_address {
            self.outputs = original_outputs;
            let changes = self.calc_change(self.fee, address, true)?;
            self.outputs.extend(changes);
        }

        Ok(())
    }

    /// Change outputs returning `provided - requested` to `address`, where
    /// requested covers the declared outputs plus `fees` and provided
    /// covers the inputs plus mint.
    ///
    /// With `precise_fee` set, each bucket additionally asserts that the
    /// remaining ADA can fund its minimum deposit.
    fn calc_change(
        &self,
        fees: u64,
        address: &Address,
        precise_fee: bool,
    ) -> Result<Vec<Output>, TxBuilderError> {
        let pparams = self.context.protocol_param();

        let mut requested = Value::new(fees as i64);
        for output in &self.outputs {
            requested += output.amount.clone();
        }

        let mut provided = Value::default();
        for utxo in &self.inputs {
            provided += utxo.output.amount.clone();
        }
        if let Some(mint) = &self.mint {
            provided.multi_asset += mint.clone();
        }

        if !(requested < provided) {
            return Err(TxBuilderError::InvalidTransaction(
                "the input utxos cannot cover the transaction outputs and fee".into(),
            ));
        }

        let mut change = provided - requested;
        if change.coin < 0 {
            return Err(TxBuilderError::InsufficientUtxoBalance(
                "not enough ada to cover fees".into(),
            ));
        }

        // Zero-quantity assets only cost bytes.
        change.multi_asset = change.multi_asset.filter(|_, _, quantity| quantity > 0);

        let mut change_outputs = Vec::new();

        // Only ADA left: the whole residual fits one output.
        if change.multi_asset.is_empty() {
            change_outputs.push(Output::new(address.clone(), Value::new(change.coin)));
            return Ok(change_outputs);
        }

        let buckets = self.pack_tokens_for_change(&change, pparams.max_val_size)?;

        let last = buckets.len() - 1;
        for (i, multi_asset) in buckets.into_iter().enumerate() {
            if precise_fee
                && change.coin
                    < min_lovelace(&Value::with_assets(0, multi_asset.clone()), pparams) as i64
            {
                return Err(TxBuilderError::InsufficientUtxoBalance(
                    "not enough ada left to cover non-ada assets in a change output".into(),
                ));
            }

            let change_value = if i == last {
                // The final bucket carries every lovelace still left.
                Value::with_assets(change.coin, multi_asset)
            } else {
                let mut value = Value::with_assets(0, multi_asset);
                value.coin = min_lovelace(&value, pparams) as i64;
                value
            };

            change -= change_value.clone();
            change.multi_asset = change.multi_asset.filter(|_, _, quantity| quantity > 0);
            change_outputs.push(Output::new(address.clone(), change_value));
        }

        Ok(change_outputs)
    }

    /// Split the multi-asset part of `change_estimator` into buckets that
    /// each serialize under `max_val_size` once paired with their coin.
    ///
    /// Greedy in policy-then-asset key order: assets accumulate into the
    /// pending bucket until the probe says the next one would overflow it,
    /// at which point the bucket is sealed and a fresh one started.
    pub(crate) fn pack_tokens_for_change(
        &self,
        change_estimator: &Value,
        max_val_size: u32,
    ) -> Result<Vec<MultiAsset>, TxBuilderError> {
        let pparams = self.context.protocol_param();
        let mut buckets: Vec<MultiAsset> = Vec::new();

        // The first pending bucket is probed with the full coin residual;
        // later ones start from zero and receive their exact deposit later.
        let mut amount = Value::new(change_estimator.coin);

        for (policy_id, assets) in change_estimator.multi_asset.iter() {
            let mut temp_assets = Asset::default();

            for (asset_name, asset_value) in assets.iter() {
                if self.adding_asset_make_output_overflow(
                    &amount,
                    &temp_assets,
                    policy_id,
                    asset_name,
                    *asset_value,
                    max_val_size,
                )? {
                    // Seal the pending bucket, folding in whatever this
                    // policy accumulated so far.
                    if !temp_assets.is_empty() {
                        amount.multi_asset +=
                            MultiAsset::from_single(*policy_id, std::mem::take(&mut temp_assets));
                    }
                    if !amount.multi_asset.is_empty() {
                        buckets.push(amount.multi_asset.clone());
                    }
                    amount = Value::new(0);
                }

                temp_assets.insert(asset_name.clone(), *asset_value);
            }

            amount.multi_asset += MultiAsset::from_single(*policy_id, temp_assets);

            // Probes are per asset, so a merge can still overflow right at a
            // policy boundary. Splitting is impossible then, and dropping
            // the rest of the change would lose funds.
            let mut updated = amount.clone();
            updated.coin = min_lovelace(&updated, pparams) as i64;
            if updated.size()? > max_val_size as usize {
                return Err(TxBuilderError::InvalidTransaction(format!(
                    "change assets under policy {policy_id} cannot be packed within the maximum value size"
                )));
            }
        }

        buckets.push(amount.multi_asset.clone());
        debug!(buckets = buckets.len(), "packed change assets");

        Ok(buckets)
    }

    /// Would adding this asset push the pending bucket past the value-size
    /// ceiling? The trial value is built out of place: a failed probe
    /// leaves the pending bucket untouched.
    fn adding_asset_make_output_overflow(
        &self,
        pending_amount: &Value,
        current_assets: &Asset,
        policy_id: &PolicyId,
        asset_name: &AssetName,
        asset_value: i64,
        max_val_size: u32,
    ) -> Result<bool, TxBuilderError> {
        let pparams = self.context.protocol_param();

        let mut attempt_assets = current_assets.clone();
        attempt_assets.insert(asset_name.clone(), asset_value);

        let mut attempt_amount =
            Value::with_assets(0, MultiAsset::from_single(*policy_id, attempt_assets));
        attempt_amount += pending_amount.clone();

        // The deposit this value will have to carry sharpens the size
        // estimate.
        attempt_amount.coin = min_lovelace(&attempt_amount, pparams) as i64;

        Ok(attempt_amount.size()? > max_val_size as usize)
    }
}
