use std::collections::BTreeMap;

use pallas::ledger::primitives::conway::{
    ExUnits as PallasExUnits, Multiasset, NonZeroInt, PlutusData, PlutusScript,
    Redeemer as PallasRedeemer, Redeemers as PallasRedeemers, ScriptData, TransactionBody,
    TransactionInput, Tx, VKeyWitness, WitnessSet,
};
use pallas::ledger::primitives::{Fragment, KeepRaw, NonEmptySet, Set};
use pallas::ledger::traverse::ComputeHash;

use super::{BuiltTransaction, TransactionBuilder, TxBuilderError};
use crate::context::ChainContext;
use crate::primitives::{AssetName, Output, PolicyId, ScriptKind};

/// Verification key standing in for every real signer while the
/// transaction is sized.
pub(crate) const FAKE_VKEY: [u8; 32] = [
    0x5e, 0x75, 0x0d, 0xb9, 0xfa, 0xcf, 0x42, 0xb1, 0x55, 0x94, 0x79, 0x0e, 0x3a, 0xc8, 0x82,
    0xed, 0x52, 0x54, 0xeb, 0x21, 0x4a, 0x74, 0x43, 0x53, 0xa2, 0xe2, 0x4e, 0x4e, 0x65, 0xb8,
    0xce, 0xb4,
];

/// An Ed25519 signature over a 32-byte message is always 64 bytes, so this
/// placeholder sizes exactly like the real one.
pub(crate) const FAKE_TX_SIGNATURE: [u8; 64] = [
    0x7a, 0x40, 0xe1, 0x27, 0x81, 0x5e, 0x62, 0x59, 0x5e, 0x8d, 0xe6, 0xfd, 0xea, 0xc6, 0xdd,
    0x03, 0x46, 0xb8, 0xdb, 0xb0, 0x27, 0x5d, 0xca, 0x5f, 0x24, 0x4b, 0x81, 0x07, 0xcf, 0xfe,
    0x9f, 0x9f, 0xd8, 0xde, 0x14, 0xb6, 0x0c, 0x3f, 0xdc, 0x34, 0x09, 0xe7, 0x06, 0x18, 0xd8,
    0x68, 0x1a, 0xfb, 0x63, 0xb6, 0x9a, 0x10, 0x7e, 0xb1, 0xaf, 0x15, 0xf8, 0xef, 0x49, 0xed,
    0xb4, 0x49, 0x40, 0x01,
];

impl<C: ChainContext> TransactionBuilder<'_, C> {
    /// Witness set for the declared scripts, datums and redeemers, without
    /// any verification-key witnesses.
    pub fn build_witness_set(&self) -> Result<WitnessSet<'_>, TxBuilderError> {
        let (mut plutus_v1_script, mut plutus_v2_script, mut plutus_v3_script) =
            (vec![], vec![], vec![]);

        for script in &self.scripts {
            match script.kind {
                ScriptKind::PlutusV1 => {
                    plutus_v1_script.push(PlutusScript::<1>(script.bytes.clone().into()))
                }
                ScriptKind::PlutusV2 => {
                    plutus_v2_script.push(PlutusScript::<2>(script.bytes.clone().into()))
                }
                ScriptKind::PlutusV3 => {
                    plutus_v3_script.push(PlutusScript::<3>(script.bytes.clone().into()))
                }
            }
        }

        let plutus_data = self
            .datums
            .iter()
            .map(|datum| {
                PlutusData::decode_fragment(datum).map_err(|_| TxBuilderError::MalformedDatum)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let redeemers = self
            .redeemers
            .iter()
            .map(|redeemer| {
                Ok(PallasRedeemer {
                    tag: redeemer.tag.clone(),
                    index: redeemer.index,
                    data: PlutusData::decode_fragment(&redeemer.data)
                        .map_err(|_| TxBuilderError::MalformedDatum)?,
                    ex_units: PallasExUnits {
                        mem: redeemer.ex_units.mem,
                        steps: redeemer.ex_units.steps,
                    },
                })
            })
            .collect::<Result<Vec<_>, TxBuilderError>>()?;

        Ok(WitnessSet {
            vkeywitness: None,
            native_script: NonEmptySet::from_vec(
                self.native_scripts
                    .iter()
                    .cloned()
                    .map(Into::into)
                    .collect(),
            ),
            bootstrap_witness: None,
            plutus_v1_script: NonEmptySet::from_vec(plutus_v1_script),
            plutus_v2_script: NonEmptySet::from_vec(plutus_v2_script),
            plutus_v3_script: NonEmptySet::from_vec(plutus_v3_script),
            plutus_data: if plutus_data.is_empty() {
                None
            } else {
                Some(KeepRaw::from(
                    NonEmptySet::from_vec(plutus_data.into_iter().map(KeepRaw::from).collect())
                        .unwrap(),
                ))
            },
            redeemer: if redeemers.is_empty() {
                None
            } else {
                Some(PallasRedeemers::List(redeemers).into())
            },
        })
    }

    /// Assemble and serialize the transaction from the current builder
    /// state, with the given verification-key witnesses in the witness set.
    pub(crate) fn assemble_tx(
        &self,
        vkey_witnesses: Option<NonEmptySet<VKeyWitness>>,
    ) -> Result<BuiltTransaction, TxBuilderError> {
        let mut inputs = self
            .inputs
            .iter()
            .map(|utxo| TransactionInput {
                transaction_id: utxo.input.transaction_id,
                index: utxo.input.index,
            })
            .collect::<Vec<_>>();

        inputs.sort_unstable_by_key(|input| (input.transaction_id, input.index));

        let outputs = self
            .outputs
            .iter()
            .map(Output::build_conway)
            .collect::<Result<Vec<_>, _>>()?;

        let mut mint_assets: BTreeMap<PolicyId, BTreeMap<AssetName, NonZeroInt>> = BTreeMap::new();
        if let Some(declared) = &self.mint {
            for (policy, assets) in declared.iter() {
                for (name, quantity) in assets.iter() {
                    let Ok(amount) = NonZeroInt::try_from(*quantity) else {
                        continue;
                    };
                    mint_assets.entry(*policy).or_default().insert(name.clone(), amount);
                }
            }
        }
        let mint: Option<Multiasset<NonZeroInt>> =
            (!mint_assets.is_empty()).then(|| mint_assets.into_iter().collect());

        let collateral = NonEmptySet::from_vec(
            self.collaterals
                .iter()
                .map(|utxo| TransactionInput {
                    transaction_id: utxo.input.transaction_id,
                    index: utxo.input.index,
                })
                .collect(),
        );

        let required_signers =
            NonEmptySet::from_vec(self.required_signers.iter().copied().collect());

        let mut witness_set = self.build_witness_set()?;
        witness_set.vkeywitness = vkey_witnesses;

        // Empty script data must yield no hash at all, never a hash of
        // emptiness.
        let script_data_hash =
            if witness_set.redeemer.is_some() || witness_set.plutus_data.is_some() {
                let script_data = ScriptData {
                    redeemers: witness_set.redeemer.clone().map(|redeemers| redeemers.unwrap()),
                    datums: witness_set.plutus_data.clone(),
                    language_views: self.language_view.clone(),
                };
                Some(script_data.hash())
            } else {
                None
            };

        let auxiliary_data_hash = self
            .auxiliary_data
            .clone()
            .map(|aux| KeepRaw::from(aux).compute_hash().into());

        let tx: Tx = Tx {
            transaction_body: TransactionBody {
                inputs: Set::from(inputs),
                outputs,
                fee: self.fee,
                ttl: self.ttl,
                validity_interval_start: self.validity_start,
                certificates: None,
                withdrawals: None,
                auxiliary_data_hash,
                mint,
                script_data_hash,
                collateral,
                required_signers,
                network_id: None,
                collateral_return: None,
                reference_inputs: None,
                total_collateral: None,
                voting_procedures: None,
                proposal_procedures: None,
                treasury_value: None,
                donation: None,
            }
            .into(),
            transaction_witness_set: witness_set.into(),
            success: true,
            auxiliary_data: self.auxiliary_data.clone().map(KeepRaw::from).into(),
        };

        Ok(BuiltTransaction {
            hash: tx.transaction_body.compute_hash(),
            bytes: tx.encode_fragment().unwrap(),
            signatures: None,
        })
    }

    /// The transaction as it will be once signed: one placeholder witness
    /// per distinct key that will have to sign. Its length is what the fee
    /// is computed from, and the ceiling the protocol size limit is
    /// enforced against.
    pub(crate) fn build_full_fake_tx(&self) -> Result<BuiltTransaction, TxBuilderError> {
        let mut vkey_hashes = self.input_vkey_hashes();
        vkey_hashes.extend(self.native_scripts_vkey_hashes());

        let fake_witnesses = NonEmptySet::from_vec(
            vkey_hashes
                .iter()
                .map(|_| VKeyWitness {
                    vkey: FAKE_VKEY.to_vec().into(),
                    signature: FAKE_TX_SIGNATURE.to_vec().into(),
                })
                .collect(),
        );

        let tx = self.assemble_tx(fake_witnesses)?;

        let size = tx.bytes.len();
        let max_tx_size = self.context.protocol_param().max_tx_size as usize;
        if size > max_tx_size {
            return Err(TxBuilderError::InvalidTransaction(format!(
                "transaction size {size} exceeds the protocol maximum {max_tx_size}; \
                 reduce the number of inputs or outputs"
            )));
        }

        Ok(tx)
    }
}
