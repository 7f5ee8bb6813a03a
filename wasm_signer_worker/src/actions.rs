use crate::types::*;
use serde::{Deserialize, Serialize};

// === ACTION TYPES ===
// Boundary representation of NEAR actions: string amounts (JSON-safe u128),
// NEAR-format key strings, JSON-string function args.

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "action_type")]
pub enum ActionParams {
    CreateAccount,
    DeployContract {
        code: Vec<u8>,
    },
    FunctionCall {
        method_name: String,
        args: String, // JSON string
        gas: String,
        deposit: String,
    },
    Transfer {
        deposit: String,
    },
    Stake {
        stake: String,
        public_key: String, // NEAR format public key
    },
    AddKey {
        public_key: String,
        access_key: String, // JSON string
    },
    DeleteKey {
        public_key: String,
    },
    DeleteAccount {
        beneficiary_id: String,
    },
    SignedDelegate {
        delegate_action: DelegateAction,
        signature: NearSignatureParam,
    },
    // NEP-0591 Global Contracts
    DeployGlobalContract {
        code: Vec<u8>,
        // "CodeHash" | "AccountId"
        deploy_mode: String,
    },
    UseGlobalContract {
        // Exactly one of these must be set
        account_id: Option<String>,
        code_hash: Option<String>, // bs58 string of a 32-byte hash
    },
}

/// Inner signature shape for SignedDelegate pass-through
pub type NearSignatureParam = Signature;

impl ActionParams {
    /// Validate the params and convert into a concrete NEAR action.
    pub fn to_action(&self) -> Result<NearAction, String> {
        match self {
            ActionParams::CreateAccount => Ok(NearAction::CreateAccount),

            ActionParams::DeployContract { code } => {
                if code.is_empty() {
                    return Err("Contract code cannot be empty".to_string());
                }
                Ok(NearAction::DeployContract { code: code.clone() })
            }

            ActionParams::FunctionCall {
                method_name,
                args,
                gas,
                deposit,
            } => {
                if method_name.is_empty() {
                    return Err("Method name cannot be empty".to_string());
                }

                let gas_amount = gas
                    .parse::<Gas>()
                    .map_err(|_| "Invalid gas amount".to_string())?;

                let deposit_amount = deposit
                    .parse::<Balance>()
                    .map_err(|_| "Invalid deposit amount".to_string())?;

                Ok(NearAction::FunctionCall(Box::new(FunctionCallAction {
                    method_name: method_name.clone(),
                    args: args.as_bytes().to_vec(),
                    gas: gas_amount,
                    deposit: deposit_amount,
                })))
            }

            ActionParams::Transfer { deposit } => {
                if deposit.is_empty() {
                    return Err("Transfer deposit cannot be empty".to_string());
                }
                let deposit_amount = deposit
                    .parse::<Balance>()
                    .map_err(|_| "Invalid deposit amount".to_string())?;
                Ok(NearAction::Transfer {
                    deposit: deposit_amount,
                })
            }

            ActionParams::Stake { stake, public_key } => {
                if stake.is_empty() {
                    return Err("Stake amount cannot be empty".to_string());
                }
                let stake_amount = stake
                    .parse::<Balance>()
                    .map_err(|_| "Invalid stake amount".to_string())?;

                let parsed_public_key = PublicKey::from_near_format(public_key)?;

                Ok(NearAction::Stake {
                    stake: stake_amount,
                    public_key: parsed_public_key,
                })
            }

            ActionParams::AddKey {
                public_key,
                access_key,
            } => {
                let parsed_public_key = PublicKey::from_near_format(public_key)?;
                let parsed_access_key: AccessKey = serde_json::from_str(access_key)
                    .map_err(|e| format!("Invalid access key JSON: {}", e))?;

                Ok(NearAction::AddKey {
                    public_key: parsed_public_key,
                    access_key: parsed_access_key,
                })
            }

            ActionParams::DeleteKey { public_key } => {
                let parsed_public_key = PublicKey::from_near_format(public_key)?;
                Ok(NearAction::DeleteKey {
                    public_key: parsed_public_key,
                })
            }

            ActionParams::DeleteAccount { beneficiary_id } => {
                let beneficiary: AccountId = beneficiary_id.parse()?;
                Ok(NearAction::DeleteAccount {
                    beneficiary_id: beneficiary,
                })
            }

            ActionParams::SignedDelegate {
                delegate_action,
                signature,
            } => Ok(NearAction::SignedDelegate(Box::new(SignedDelegate {
                delegate_action: delegate_action.clone(),
                signature: signature.clone(),
            }))),

            ActionParams::DeployGlobalContract { code, deploy_mode } => {
                if code.is_empty() {
                    return Err("Contract code cannot be empty".to_string());
                }
                let mode = match deploy_mode.as_str() {
                    "CodeHash" => GlobalContractDeployMode::CodeHash,
                    "AccountId" => GlobalContractDeployMode::AccountId,
                    other => return Err(format!("Invalid deploy mode: {}", other)),
                };
                Ok(NearAction::DeployGlobalContract {
                    code: code.clone(),
                    deploy_mode: mode,
                })
            }

            ActionParams::UseGlobalContract {
                account_id,
                code_hash,
            } => {
                let identifier = match (account_id, code_hash) {
                    (Some(account), None) => {
                        GlobalContractIdentifier::AccountId(account.parse()?)
                    }
                    (None, Some(hash)) => {
                        let bytes = bs58::decode(hash)
                            .into_vec()
                            .map_err(|e| format!("Invalid code hash: {}", e))?;
                        if bytes.len() != 32 {
                            return Err("Code hash must be 32 bytes".to_string());
                        }
                        let mut hash_array = [0u8; 32];
                        hash_array.copy_from_slice(&bytes);
                        GlobalContractIdentifier::CodeHash(CryptoHash::from_bytes(hash_array))
                    }
                    _ => {
                        return Err(
                            "UseGlobalContract requires exactly one of account_id or code_hash"
                                .to_string(),
                        )
                    }
                };
                Ok(NearAction::UseGlobalContract {
                    contract_identifier: identifier,
                })
            }
        }
    }
}
