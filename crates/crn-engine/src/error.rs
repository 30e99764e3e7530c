use rust_decimal::Decimal;
use thiserror::Error;

/// Every way a save can be rejected. `code()` is the stable machine-readable
/// identifier clients key on; the `Display` text is for the operator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("the comment is limited to {limit} characters")]
    CommentTooLong { limit: usize },

    #[error("a reconciliation may include at most {limit} movements")]
    TooManyMovements { limit: usize },

    #[error("a reconciliation may include at most {limit} account entries")]
    TooManyAccountEntries { limit: usize },

    #[error("the {field} field is limited to {limit} characters")]
    FieldTooLong { field: &'static str, limit: usize },

    #[error("'{text}' is not a valid amount")]
    InvalidAmount { text: String },

    #[error("an account-only reconciliation does not include movements")]
    AccountOnlyExcludesMovements,

    #[error("one or more movements are not eligible for this reconciliation")]
    InvalidMovementId,

    #[error("movements with different currencies can not be reconciled together")]
    MultipleCurrencies,

    #[error("movements with different cash designs can not be reconciled together")]
    MultipleCashDesigns,

    #[error("movements from different transfers can not be reconciled together")]
    MultipleTransfers,

    #[error("movements from different peers can not be reconciled together")]
    MultiplePeers,

    #[error("an amount is required for each account entry")]
    AmountRequired,

    #[error("unable to parse the amount '{text}'")]
    AmountParseError { text: String },

    #[error("the amount currency should be {expected}")]
    CurrencyMismatch { expected: String },

    #[error("a date is required for each account entry")]
    DateRequired,

    #[error("unable to parse the date '{text}'")]
    DateParseError { text: String },

    #[error("one or more account entries are not eligible for this reconciliation")]
    InvalidAccountEntryId,

    #[error("the reconciliation record was not found")]
    RecoNotFound,

    #[error(
        "the reconciliation is unbalanced: wallet {wallet_sum} + vault {vault_sum} \
         + account {account_sum} != 0"
    )]
    UnbalancedReconciliation {
        wallet_sum: Decimal,
        vault_sum: Decimal,
        account_sum: Decimal,
    },

    #[error("a wallet-only reconciliation can not include vault movements")]
    WalletOnlyExcludesVault,

    #[error("a comment is required for this type of reconciliation")]
    CommentRequired,

    #[error("store failure: {message}")]
    Store { message: String },
}

impl SaveError {
    pub fn code(&self) -> &'static str {
        match self {
            SaveError::CommentTooLong { .. } => "comment_too_long",
            SaveError::TooManyMovements { .. } => "too_many_movements",
            SaveError::TooManyAccountEntries { .. } => "too_many_account_entries",
            SaveError::FieldTooLong { .. } => "field_too_long",
            SaveError::InvalidAmount { .. } => "invalid_amount",
            SaveError::AccountOnlyExcludesMovements => "account_only_excludes_movements",
            SaveError::InvalidMovementId => "invalid_movement_id",
            SaveError::MultipleCurrencies => "multiple_currencies",
            SaveError::MultipleCashDesigns => "multiple_cash_designs",
            SaveError::MultipleTransfers => "multiple_transfers",
            SaveError::MultiplePeers => "multiple_peers",
            SaveError::AmountRequired => "amount_required",
            SaveError::AmountParseError { .. } => "amount_parse_error",
            SaveError::CurrencyMismatch { .. } => "currency_mismatch",
            SaveError::DateRequired => "date_required",
            SaveError::DateParseError { .. } => "date_parse_error",
            SaveError::InvalidAccountEntryId => "invalid_account_entry_id",
            SaveError::RecoNotFound => "reco_not_found",
            SaveError::UnbalancedReconciliation { .. } => "unbalanced_reconciliation",
            SaveError::WalletOnlyExcludesVault => "wallet_only_excludes_vault",
            SaveError::CommentRequired => "comment_required",
            SaveError::Store { .. } => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SaveError::RecoNotFound.code(), "reco_not_found");
        assert_eq!(
            SaveError::CommentTooLong { limit: 10_000 }.code(),
            "comment_too_long"
        );
        assert_eq!(
            SaveError::CurrencyMismatch {
                expected: "USD".into()
            }
            .code(),
            "currency_mismatch"
        );
    }

    #[test]
    fn display_is_operator_prose() {
        let err = SaveError::UnbalancedReconciliation {
            wallet_sum: "4.10".parse().unwrap(),
            vault_sum: "0".parse().unwrap(),
            account_sum: "-4.00".parse().unwrap(),
        };
        let text = err.to_string();
        assert!(text.contains("unbalanced"));
        assert!(text.contains("4.10"));
    }
}
