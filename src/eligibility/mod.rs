//! Eligibility gate
//!
//! Pure checks on a customer (and optionally a product) that collect every
//! failing reason instead of stopping at the first one.

use serde::Serialize;
use std::fmt;

use crate::account::ProductStatus;
use crate::customer::{CustomerStatus, KycProfile, KycStatus};
use crate::error::{DomainError, DomainResult};

/// Documents demanded before a product can be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycDocument {
    NationalId,
    ProofOfAddress,
    Photo,
    IncomeProof,
}

impl KycDocument {
    fn label(&self) -> &'static str {
        match self {
            KycDocument::NationalId => "national ID",
            KycDocument::ProofOfAddress => "proof of address",
            KycDocument::Photo => "photo",
            KycDocument::IncomeProof => "income proof",
        }
    }
}

/// One reason a customer cannot proceed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    CustomerNotFound,
    Blacklisted,
    Inactive,
    NotActive(CustomerStatus),
    KycMissing,
    KycPending,
    KycIncomplete,
    KycExpired,
    MissingDocuments(Vec<KycDocument>),
    ProductNotFound,
    ProductUnavailable(String),
    DuplicateAccount { product: String, account_number: String },
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Ineligibility::CustomerNotFound => write!(f, "customer not found"),
            Ineligibility::Blacklisted => write!(f, "customer is blacklisted"),
            Ineligibility::Inactive => write!(f, "customer is inactive"),
            Ineligibility::NotActive(status) => {
                write!(f, "customer must be ACTIVE, currently {:?}", status)
            }
            Ineligibility::KycMissing => write!(f, "KYC profile has not been started"),
            Ineligibility::KycPending => write!(f, "KYC verification is pending"),
            Ineligibility::KycIncomplete => write!(f, "KYC is incomplete"),
            Ineligibility::KycExpired => write!(f, "KYC has expired and must be renewed"),
            Ineligibility::MissingDocuments(docs) => {
                let labels: Vec<&str> = docs.iter().map(KycDocument::label).collect();
                write!(f, "missing KYC documents: {}", labels.join(", "))
            }
            Ineligibility::ProductNotFound => write!(f, "product not found"),
            Ineligibility::ProductUnavailable(name) => {
                write!(f, "product {} is not available", name)
            }
            Ineligibility::DuplicateAccount {
                product,
                account_number,
            } => write!(
                f,
                "customer already holds an active {} account ({})",
                product, account_number
            ),
        }
    }
}

/// What the gate needs to know about a customer
#[derive(Debug, Clone)]
pub struct CustomerFacts<'a> {
    pub status: CustomerStatus,
    pub kyc: Option<&'a KycProfile>,
}

/// What the gate needs to know about a product
#[derive(Debug, Clone)]
pub struct ProductFacts<'a> {
    pub name: &'a str,
    pub status: ProductStatus,
    pub allow_multiple: bool,
    /// Account number of an existing active account of this product, if any
    pub existing_account: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

impl From<Vec<Ineligibility>> for EligibilityReport {
    fn from(failures: Vec<Ineligibility>) -> Self {
        Self {
            eligible: failures.is_empty(),
            reasons: failures.iter().map(ToString::to_string).collect(),
        }
    }
}

impl EligibilityReport {
    /// Turn a failing report into `IneligibleCustomer`
    pub fn into_result(self) -> DomainResult<()> {
        if self.eligible {
            Ok(())
        } else {
            Err(DomainError::IneligibleCustomer {
                reasons: self.reasons,
            })
        }
    }
}

fn kyc_failures(kyc: Option<&KycProfile>, failures: &mut Vec<Ineligibility>) {
    let profile = match kyc {
        Some(profile) => profile,
        None => {
            failures.push(Ineligibility::KycMissing);
            return;
        }
    };

    match profile.status {
        KycStatus::Pending => failures.push(Ineligibility::KycPending),
        KycStatus::Incomplete => failures.push(Ineligibility::KycIncomplete),
        KycStatus::Expired => failures.push(Ineligibility::KycExpired),
        KycStatus::Complete => {
            let missing: Vec<KycDocument> = [
                (profile.has_national_id, KycDocument::NationalId),
                (profile.has_proof_of_address, KycDocument::ProofOfAddress),
                (profile.has_photo_proof, KycDocument::Photo),
                (profile.has_income_proof, KycDocument::IncomeProof),
            ]
            .into_iter()
            .filter(|(present, _)| !present)
            .map(|(_, doc)| doc)
            .collect();

            if !missing.is_empty() {
                failures.push(Ineligibility::MissingDocuments(missing));
            }
        }
    }
}

/// Run every check and return all failures, in evaluation order.
///
/// A missing customer ends evaluation immediately, as does a missing product
/// for the product checks.
pub fn assess(
    customer: Option<&CustomerFacts<'_>>,
    product: Option<Option<&ProductFacts<'_>>>,
) -> Vec<Ineligibility> {
    let customer = match customer {
        Some(customer) => customer,
        None => return vec![Ineligibility::CustomerNotFound],
    };

    let mut failures = Vec::new();

    match customer.status {
        CustomerStatus::Active => {}
        CustomerStatus::Blacklisted => failures.push(Ineligibility::Blacklisted),
        CustomerStatus::Inactive => failures.push(Ineligibility::Inactive),
        other => failures.push(Ineligibility::NotActive(other)),
    }

    kyc_failures(customer.kyc, &mut failures);

    match product {
        None => {}
        Some(None) => failures.push(Ineligibility::ProductNotFound),
        Some(Some(product)) => {
            if product.status != ProductStatus::Active {
                failures.push(Ineligibility::ProductUnavailable(product.name.to_string()));
            }
            if let (false, Some(account_number)) = (product.allow_multiple, product.existing_account) {
                failures.push(Ineligibility::DuplicateAccount {
                    product: product.name.to_string(),
                    account_number: account_number.to_string(),
                });
            }
        }
    }

    failures
}

/// Gate used by the loan lifecycle: KYC status alone must be COMPLETE
pub fn require_complete_kyc(status: Option<KycStatus>) -> DomainResult<()> {
    let failure = match status {
        Some(KycStatus::Complete) => return Ok(()),
        Some(KycStatus::Pending) => Ineligibility::KycPending,
        Some(KycStatus::Incomplete) => Ineligibility::KycIncomplete,
        Some(KycStatus::Expired) => Ineligibility::KycExpired,
        None => Ineligibility::KycMissing,
    };

    EligibilityReport::from(vec![failure]).into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn profile(status: KycStatus, documents: bool) -> KycProfile {
        KycProfile {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            status,
            has_national_id: documents,
            has_proof_of_address: documents,
            has_photo_proof: documents,
            has_income_proof: documents,
            verified_by: None,
            verified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn savings(existing: Option<&str>) -> ProductFacts<'_> {
        ProductFacts {
            name: "Jumbo Savings",
            status: ProductStatus::Active,
            allow_multiple: false,
            existing_account: existing,
        }
    }

    #[test]
    fn test_eligible_customer_has_no_reasons() {
        let kyc = profile(KycStatus::Complete, true);
        let customer = CustomerFacts {
            status: CustomerStatus::Active,
            kyc: Some(&kyc),
        };
        let report = EligibilityReport::from(assess(Some(&customer), Some(Some(&savings(None)))));
        assert!(report.eligible);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn test_failures_accumulate() {
        let kyc = profile(KycStatus::Incomplete, false);
        let customer = CustomerFacts {
            status: CustomerStatus::Blacklisted,
            kyc: Some(&kyc),
        };
        let failures = assess(Some(&customer), None);
        assert_eq!(
            failures,
            vec![Ineligibility::Blacklisted, Ineligibility::KycIncomplete]
        );
    }

    #[test]
    fn test_missing_customer_short_circuits() {
        assert_eq!(
            assess(None, Some(None)),
            vec![Ineligibility::CustomerNotFound]
        );
    }

    #[test]
    fn test_document_checklist_only_for_complete_kyc() {
        let mut kyc = profile(KycStatus::Complete, true);
        kyc.has_income_proof = false;
        kyc.has_photo_proof = false;
        let customer = CustomerFacts {
            status: CustomerStatus::Active,
            kyc: Some(&kyc),
        };
        assert_eq!(
            assess(Some(&customer), None),
            vec![Ineligibility::MissingDocuments(vec![
                KycDocument::Photo,
                KycDocument::IncomeProof
            ])]
        );
    }

    #[test]
    fn test_product_checks() {
        let kyc = profile(KycStatus::Complete, true);
        let customer = CustomerFacts {
            status: CustomerStatus::Prospect,
            kyc: Some(&kyc),
        };

        let mut product = savings(Some("MF-HQ1-00000001"));
        product.status = ProductStatus::Inactive;
        let failures = assess(Some(&customer), Some(Some(&product)));
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0], Ineligibility::NotActive(CustomerStatus::Prospect));

        product.allow_multiple = true;
        product.status = ProductStatus::Active;
        assert_eq!(assess(Some(&customer), Some(Some(&product))).len(), 1);

        assert!(assess(Some(&customer), Some(None)).contains(&Ineligibility::ProductNotFound));
    }

    #[test]
    fn test_missing_kyc_profile() {
        let customer = CustomerFacts {
            status: CustomerStatus::Active,
            kyc: None,
        };
        assert_eq!(assess(Some(&customer), None), vec![Ineligibility::KycMissing]);
    }

    #[test]
    fn test_require_complete_kyc() {
        assert!(require_complete_kyc(Some(KycStatus::Complete)).is_ok());
        match require_complete_kyc(Some(KycStatus::Pending)) {
            Err(DomainError::IneligibleCustomer { reasons }) => {
                assert_eq!(reasons, vec!["KYC verification is pending".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(require_complete_kyc(None).is_err());
    }

    #[test]
    fn test_reason_text() {
        let reason = Ineligibility::MissingDocuments(vec![KycDocument::NationalId, KycDocument::Photo]);
        assert_eq!(reason.to_string(), "missing KYC documents: national ID, photo");
    }
}
