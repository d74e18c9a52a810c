//! Declarative transaction builder: accumulate intent, then balance the
//! transaction, pack change and fit the fee in [`TransactionBuilder::build`].

use std::collections::{HashMap, HashSet};

use pallas::ledger::addresses::Address;
use pallas::ledger::primitives::conway::{AuxiliaryData, LanguageViews, NativeScript};
use tracing::{debug, info};

use crate::context::ChainContext;
use crate::primitives::{
    datum_hash, native_script_vkey_hashes, payment_key_hash, Ed25519Signer, Input, MultiAsset,
    Output, PubKeyHash, Redeemer, Script, Utxo, Value,
};
use crate::selection::{LargestFirstSelector, RandomImproveMultiAsset, UtxoSelector};

mod build;
mod built;
mod change;
mod error;
pub mod fee;
#[cfg(test)]
mod tests;

pub use built::BuiltTransaction;
pub use error::TxBuilderError;

/// Accumulates declarative transaction intent until [`build`] turns it into
/// a balanced, fee-accurate transaction.
///
/// Declarations move the builder (`self -> Self`) so they chain; `build`
/// borrows it mutably so the same builder can be inspected afterwards or
/// rebuilt. A builder must not be shared across threads mid-build; distinct
/// builders over one chain context are independent.
///
/// [`build`]: TransactionBuilder::build
impl<'a, C: ChainContext> std::fmt::Debug for TransactionBuilder<'a, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("inputs", &self.inputs)
            .field("excluded_inputs", &self.excluded_inputs)
            .field("input_addresses", &self.input_addresses)
            .field("outputs", &self.outputs)
            .field("fee", &self.fee)
            .field("ttl", &self.ttl)
            .field("validity_start", &self.validity_start)
            .field("mint", &self.mint)
            .field("native_scripts", &self.native_scripts)
            .field("required_signers", &self.required_signers)
            .field("scripts", &self.scripts)
            .field("datums", &self.datums)
            .field("redeemers", &self.redeemers)
            .field("collaterals", &self.collaterals)
            .field("auxiliary_data", &self.auxiliary_data)
            .field("language_view", &self.language_view)
            .finish_non_exhaustive()
    }
}

pub struct TransactionBuilder<'a, C: ChainContext> {
    context: &'a C,
    utxo_selectors: Vec<Box<dyn UtxoSelector>>,
    pub inputs: Vec<Utxo>,
    pub excluded_inputs: Vec<Utxo>,
    pub input_addresses: Vec<Address>,
    pub outputs: Vec<Output>,
    pub fee: u64,
    pub ttl: Option<u64>,
    pub validity_start: Option<u64>,
    pub mint: Option<MultiAsset>,
    pub native_scripts: Vec<NativeScript>,
    pub required_signers: Vec<PubKeyHash>,
    pub scripts: Vec<Script>,
    /// Raw PlutusData CBOR destined for the witness set.
    pub datums: Vec<Vec<u8>>,
    pub redeemers: Vec<Redeemer>,
    inputs_to_redeemers: HashMap<Input, usize>,
    pub collaterals: Vec<Utxo>,
    pub auxiliary_data: Option<AuxiliaryData>,
    pub language_view: Option<LanguageViews>,
}

struct Snapshot {
    inputs: Vec<Utxo>,
    outputs: Vec<Output>,
    fee: u64,
    redeemers: Vec<Redeemer>,
    inputs_to_redeemers: HashMap<Input, usize>,
}

impl<'a, C: ChainContext> TransactionBuilder<'a, C> {
    /// Builder with the default selector order: Random-Improve first,
    /// Largest-First as the deterministic fallback.
    pub fn new(context: &'a C) -> Self {
        Self::with_selectors(
            context,
            vec![
                Box::new(RandomImproveMultiAsset::new()),
                Box::new(LargestFirstSelector),
            ],
        )
    }

    /// Builder with a custom selector order. Selectors are tried in the
    /// given order until one succeeds.
    pub fn with_selectors(context: &'a C, utxo_selectors: Vec<Box<dyn UtxoSelector>>) -> Self {
        Self {
            context,
            utxo_selectors,
            inputs: Vec::new(),
            excluded_inputs: Vec::new(),
            input_addresses: Vec::new(),
            outputs: Vec::new(),
            fee: 0,
            ttl: None,
            validity_start: None,
            mint: None,
            native_scripts: Vec::new(),
            required_signers: Vec::new(),
            scripts: Vec::new(),
            datums: Vec::new(),
            redeemers: Vec::new(),
            inputs_to_redeemers: HashMap::new(),
            collaterals: Vec::new(),
            auxiliary_data: None,
            language_view: None,
        }
    }

    /// Spend a specific UTxO.
    ///
    /// UTxOs added here are fixed; anything still missing at build time is
    /// drawn from the declared input addresses instead.
    pub fn add_input(mut self, utxo: Utxo) -> Self {
        self.inputs.push(utxo);
        self
    }

    /// Spend a script-locked UTxO, providing the script, the datum it was
    /// locked with and the redeemer to run it under.
    ///
    /// The UTxO must sit at a script address and its datum hash must match
    /// the supplied datum.
    pub fn add_script_input(
        mut self,
        utxo: Utxo,
        script: Script,
        datum: Vec<u8>,
        redeemer: Redeemer,
    ) -> Result<Self, TxBuilderError> {
        if !utxo.output.address.has_script() {
            return Err(TxBuilderError::InvalidArgument(format!(
                "expected the output address of utxo {}#{} to be a script address",
                utxo.input.transaction_id, utxo.input.index
            )));
        }
        let supplied_hash = datum_hash(&datum);
        if utxo.output.datum_hash != Some(supplied_hash) {
            return Err(TxBuilderError::InvalidArgument(format!(
                "datum hash in transaction output is {:?}, but the supplied datum hashes to {}",
                utxo.output.datum_hash, supplied_hash
            )));
        }

        self.scripts.push(script);
        self.datums.push(datum);
        self.redeemers.push(redeemer);
        self.inputs_to_redeemers
            .insert(utxo.input, self.redeemers.len() - 1);
        self.inputs.push(utxo);
        Ok(self)
    }

    /// Never spend this UTxO, even if a selector would pick it.
    pub fn exclude_input(mut self, utxo: Utxo) -> Self {
        self.excluded_inputs.push(utxo);
        self
    }

    /// Allow selectors to draw from this address. Nothing is fetched until
    /// [`build`](Self::build) runs and finds the declared inputs wanting.
    pub fn add_input_address(mut self, address: Address) -> Self {
        self.input_addresses.push(address);
        self
    }

    /// Add a transaction output, optionally binding a datum to it by hash.
    /// With `add_datum_to_witness` the datum itself also travels in the
    /// witness set.
    pub fn add_output(
        mut self,
        mut output: Output,
        datum: Option<Vec<u8>>,
        add_datum_to_witness: bool,
    ) -> Self {
        if let Some(datum) = datum {
            output.datum_hash = Some(datum_hash(&datum));
            if add_datum_to_witness {
                self.datums.push(datum);
            }
        }
        self.outputs.push(output);
        self
    }

    /// Last slot this transaction is valid in.
    pub fn ttl(mut self, slot: u64) -> Self {
        self.ttl = Some(slot);
        self
    }

    /// First slot this transaction is valid in.
    pub fn validity_start(mut self, slot: u64) -> Self {
        self.validity_start = Some(slot);
        self
    }

    /// Assets to mint (positive quantities) or burn (negative).
    pub fn mint(mut self, mint: MultiAsset) -> Self {
        self.mint = Some(mint);
        self
    }

    pub fn native_scripts(mut self, scripts: Vec<NativeScript>) -> Self {
        self.native_scripts = scripts;
        self
    }

    pub fn required_signers(mut self, signers: Vec<PubKeyHash>) -> Self {
        self.required_signers = signers;
        self
    }

    /// UTxOs forfeited if a Plutus script fails phase-2 validation.
    pub fn collaterals(mut self, collaterals: Vec<Utxo>) -> Self {
        self.collaterals = collaterals;
        self
    }

    /// Attach metadata, supplied as CBOR-encoded auxiliary data.
    pub fn auxiliary_data(mut self, data: Vec<u8>) -> Result<Self, TxBuilderError> {
        let aux = pallas::codec::minicbor::decode::<AuxiliaryData>(&data)
            .map_err(|_| TxBuilderError::MalformedAuxiliaryData)?;
        self.auxiliary_data = Some(aux);
        Ok(self)
    }

    /// Cost-model view hashed into the script data hash alongside the
    /// redeemers and datums.
    pub fn language_view(mut self, language_view: LanguageViews) -> Self {
        self.language_view = Some(language_view);
        self
    }

    /// Resolve unfulfilled demand through the registered selectors, pack
    /// change, fit the fee and assemble the final transaction.
    ///
    /// Change outputs go to `change_address`; without one the transaction
    /// is left unbalanced (inputs exceeding outputs plus fee).
    ///
    /// On success the builder retains the final state: selected inputs,
    /// appended change outputs, the exact fee, indexed redeemers. On any
    /// error that state is rolled back to what it was before the call.
    pub fn build(&mut self, change_address: Option<&Address>) -> Result<BuiltTransaction, TxBuilderError> {
        let snapshot = self.snapshot();
        match self.build_inner(change_address) {
            Ok(tx) => Ok(tx),
            Err(e) => {
                self.restore(snapshot);
                Err(e)
            }
        }
    }

    /// [`build`](Self::build), then sign the body hash with every key and
    /// append the verification-key witnesses.
    pub fn build_and_sign<K: Ed25519Signer>(
        &mut self,
        signing_keys: &[K],
        change_address: Option<&Address>,
    ) -> Result<BuiltTransaction, TxBuilderError> {
        let mut tx = self.build(change_address)?;
        for signing_key in signing_keys {
            tx = tx.sign(signing_key)?;
        }
        Ok(tx)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            fee: self.fee,
            redeemers: self.redeemers.clone(),
            inputs_to_redeemers: self.inputs_to_redeemers.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.inputs = snapshot.inputs;
        self.outputs = snapshot.outputs;
        self.fee = snapshot.fee;
        self.redeemers = snapshot.redeemers;
        self.inputs_to_redeemers = snapshot.inputs_to_redeemers;
    }

    fn build_inner(&mut self, change_address: Option<&Address>) -> Result<BuiltTransaction, TxBuilderError> {
        self.ensure_no_input_exclusion_conflict()?;

        let mut selected_utxos = self.inputs.clone();
        let mut selected_amount = Value::default();
        for utxo in &selected_utxos {
            selected_amount += utxo.output.amount.clone();
        }
        if let Some(mint) = &self.mint {
            selected_amount.multi_asset += mint.clone();
        }

        let mut requested_amount = Value::default();
        for output in &self.outputs {
            requested_amount += output.amount.clone();
        }

        // Assets nobody asked for come back as change anyway; they play no
        // part in selection arithmetic.
        let trimmed_selected_amount = Value::with_assets(
            selected_amount.coin,
            selected_amount
                .multi_asset
                .filter(|policy, name, _| requested_amount.multi_asset.contains(policy, name)),
        );

        let mut unfulfilled_amount = requested_amount - trimmed_selected_amount;
        unfulfilled_amount.coin = unfulfilled_amount.coin.max(0);
        unfulfilled_amount.multi_asset =
            unfulfilled_amount.multi_asset.filter(|_, _, quantity| quantity > 0);

        if !unfulfilled_amount.is_empty() {
            let mut additional_utxo_pool = Vec::new();
            for address in &self.input_addresses {
                for utxo in self.context.utxos(address)? {
                    if !selected_utxos.contains(&utxo) && !self.excluded_inputs.contains(&utxo) {
                        additional_utxo_pool.push(utxo);
                    }
                }
            }
            debug!(
                candidates = additional_utxo_pool.len(),
                "drawing on input addresses to cover the remaining demand"
            );

            for (i, selector) in self.utxo_selectors.iter().enumerate() {
                match selector.select(&additional_utxo_pool, &unfulfilled_amount, self.context) {
                    Ok((selected, _)) => {
                        for utxo in selected {
                            selected_amount += utxo.output.amount.clone();
                            selected_utxos.push(utxo);
                        }
                        break;
                    }
                    Err(TxBuilderError::UtxoSelection(e)) if i + 1 < self.utxo_selectors.len() => {
                        info!(error = %e, "selector failed, trying the next one");
                    }
                    Err(TxBuilderError::UtxoSelection(_)) => {
                        return Err(TxBuilderError::UtxoSelection(
                            "all utxo selectors failed".into(),
                        ));
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        selected_utxos.sort_unstable_by_key(|utxo| (utxo.input.transaction_id, utxo.input.index));
        self.inputs = selected_utxos;

        self.set_redeemer_index();

        self.add_change_and_fee(change_address)?;

        self.assemble_tx(None)
    }

    /// Redeemer indices follow the position of their input in the final
    /// sorted input list; the redeemer list itself is ordered by index.
    fn set_redeemer_index(&mut self) {
        for (position, utxo) in self.inputs.iter().enumerate() {
            if let Some(&slot) = self.inputs_to_redeemers.get(&utxo.input) {
                self.redeemers[slot].index = position as u32;
            }
        }
        self.redeemers.sort_by_key(|redeemer| redeemer.index);

        // Re-point the input association at the sorted positions so a later
        // rebuild assigns indices to the right redeemers again.
        let mut rebuilt = HashMap::new();
        for (slot, redeemer) in self.redeemers.iter().enumerate() {
            rebuilt.insert(self.inputs[redeemer.index as usize].input, slot);
        }
        self.inputs_to_redeemers = rebuilt;
    }

    fn ensure_no_input_exclusion_conflict(&self) -> Result<(), TxBuilderError> {
        for utxo in &self.inputs {
            if self.excluded_inputs.contains(utxo) {
                return Err(TxBuilderError::Conflict(format!(
                    "utxo {}#{} appears in both the inputs and the excluded inputs",
                    utxo.input.transaction_id, utxo.input.index
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn input_vkey_hashes(&self) -> HashSet<PubKeyHash> {
        let mut hashes = HashSet::new();
        for utxo in self.inputs.iter().chain(self.collaterals.iter()) {
            if let Some(hash) = payment_key_hash(&utxo.output.address) {
                hashes.insert(hash);
            }
        }
        hashes
    }

    pub(crate) fn native_scripts_vkey_hashes(&self) -> HashSet<PubKeyHash> {
        let mut hashes = HashSet::new();
        for script in &self.native_scripts {
            native_script_vkey_hashes(script, &mut hashes);
        }
        hashes
    }
}
