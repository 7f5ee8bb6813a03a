use crate::actions::ActionParams;
use crate::types::{AccessKeyPermission, NearAction};

#[test]
fn function_call_params_build_a_function_call_action() {
    let params = ActionParams::FunctionCall {
        method_name: "set_greeting".to_string(),
        args: r#"{"greeting":"hello"}"#.to_string(),
        gas: "30000000000000".to_string(),
        deposit: "0".to_string(),
    };

    match params.to_action().unwrap() {
        NearAction::FunctionCall(fc) => {
            assert_eq!(fc.method_name, "set_greeting");
            assert_eq!(fc.gas, 30_000_000_000_000);
            assert_eq!(fc.deposit, 0);
            assert_eq!(fc.args, br#"{"greeting":"hello"}"#.to_vec());
        }
        other => panic!("expected FunctionCall, got {:?}", other),
    }
}

#[test]
fn function_call_rejects_empty_method_and_bad_amounts() {
    let empty_method = ActionParams::FunctionCall {
        method_name: "".to_string(),
        args: "{}".to_string(),
        gas: "1".to_string(),
        deposit: "0".to_string(),
    };
    assert!(empty_method.to_action().is_err());

    let bad_gas = ActionParams::FunctionCall {
        method_name: "m".to_string(),
        args: "{}".to_string(),
        gas: "not-a-number".to_string(),
        deposit: "0".to_string(),
    };
    assert!(bad_gas.to_action().is_err());
}

#[test]
fn transfer_parses_yocto_amounts_beyond_u64() {
    let params = ActionParams::Transfer {
        deposit: "340282366920938463463374607431768211455".to_string(), // u128::MAX
    };
    match params.to_action().unwrap() {
        NearAction::Transfer { deposit } => assert_eq!(deposit, u128::MAX),
        other => panic!("expected Transfer, got {:?}", other),
    }
}

#[test]
fn add_key_parses_near_style_access_key_json() {
    let params = ActionParams::AddKey {
        public_key: "ed25519:6E8sCci9badyRkXb3JoRpBj5p8C6Tw41ELDZoiihKEtp".to_string(),
        access_key: r#"{"nonce":0,"permission":{"FunctionCall":{"allowance":"250000000000000000000000","receiverId":"w3a-v1.testnet","methodNames":[]}}}"#.to_string(),
    };

    match params.to_action().unwrap() {
        NearAction::AddKey { access_key, .. } => match access_key.permission {
            AccessKeyPermission::FunctionCall(fc) => {
                assert_eq!(fc.receiver_id, "w3a-v1.testnet");
                assert_eq!(fc.allowance, Some(250_000_000_000_000_000_000_000));
            }
            other => panic!("expected FunctionCall permission, got {:?}", other),
        },
        other => panic!("expected AddKey, got {:?}", other),
    }
}

#[test]
fn add_key_parses_full_access_permission() {
    let params = ActionParams::AddKey {
        public_key: "ed25519:6E8sCci9badyRkXb3JoRpBj5p8C6Tw41ELDZoiihKEtp".to_string(),
        access_key: r#"{"nonce":5,"permission":{"FullAccess":{}}}"#.to_string(),
    };

    match params.to_action().unwrap() {
        NearAction::AddKey { access_key, .. } => {
            assert_eq!(access_key.nonce, 5);
            assert_eq!(access_key.permission, AccessKeyPermission::FullAccess);
        }
        other => panic!("expected AddKey, got {:?}", other),
    }
}

#[test]
fn use_global_contract_requires_exactly_one_identifier() {
    let neither = ActionParams::UseGlobalContract {
        account_id: None,
        code_hash: None,
    };
    assert!(neither.to_action().is_err());

    let both = ActionParams::UseGlobalContract {
        account_id: Some("lib.testnet".to_string()),
        code_hash: Some(bs58::encode([1u8; 32]).into_string()),
    };
    assert!(both.to_action().is_err());

    let by_account = ActionParams::UseGlobalContract {
        account_id: Some("lib.testnet".to_string()),
        code_hash: None,
    };
    assert!(by_account.to_action().is_ok());
}

#[test]
fn action_params_roundtrip_through_tagged_json() {
    let params = vec![
        ActionParams::CreateAccount,
        ActionParams::Transfer {
            deposit: "1".to_string(),
        },
        ActionParams::DeleteAccount {
            beneficiary_id: "bob.testnet".to_string(),
        },
    ];
    let json = serde_json::to_string(&params).unwrap();
    assert!(json.contains(r#""action_type":"Transfer""#));
    let parsed: Vec<ActionParams> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, params);
}
