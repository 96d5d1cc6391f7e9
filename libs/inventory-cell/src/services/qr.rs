use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::models::{LedgerError, QrPayload, ReagentLot};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies the JSON payload printed on lot labels.
pub struct QrSigner {
    secret: String,
}

impl QrSigner {
    pub fn new(secret: &str) -> Self {
        Self { secret: secret.to_string() }
    }

    fn mac(&self) -> Result<HmacSha256, LedgerError> {
        if self.secret.is_empty() {
            return Err(LedgerError::InvalidQrPayload("QR signing secret is not configured".to_string()));
        }
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| LedgerError::InvalidQrPayload(e.to_string()))
    }

    /// Canonical form: the payload without `sig`, keys in sorted order.
    fn canonical(payload: &QrPayload) -> Result<String, LedgerError> {
        let unsigned = QrPayload { sig: None, ..payload.clone() };
        let value = serde_json::to_value(&unsigned)?;
        Ok(serde_json::to_string(&value)?)
    }

    pub fn payload_for(lot: &ReagentLot, registered_at: DateTime<Utc>) -> QrPayload {
        QrPayload {
            lot_id: lot.id,
            reagent_name: lot.reagent_name().to_string(),
            lot_number: lot.lot_number.clone(),
            manufacturer: lot.manufacturers.as_ref().map(|m| m.name.clone()),
            expiry_date: lot.expiry_date,
            quantity: lot.current_quantity,
            unit_measure: lot.unit_measure().map(str::to_string),
            location: lot.location.clone(),
            registered_at,
            sig: None,
        }
    }

    pub fn sign(&self, payload: QrPayload) -> Result<QrPayload, LedgerError> {
        let mut mac = self.mac()?;
        mac.update(Self::canonical(&payload)?.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(QrPayload { sig: Some(sig), ..payload })
    }

    /// Parses scanned text and checks its signature.
    pub fn verify(&self, data: &str) -> Result<QrPayload, LedgerError> {
        let payload: QrPayload = serde_json::from_str(data.trim())
            .map_err(|e| LedgerError::InvalidQrPayload(format!("not a lot label: {}", e)))?;

        let sig = payload.sig.as_deref()
            .ok_or_else(|| LedgerError::InvalidQrPayload("payload is not signed".to_string()))?;
        let signature = URL_SAFE_NO_PAD.decode(sig)
            .map_err(|_| LedgerError::InvalidQrPayload("signature is not base64url".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(Self::canonical(&payload)?.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            debug!("QR signature mismatch for lot {}", payload.lot_id);
            return Err(LedgerError::InvalidQrPayload("signature does not match".to_string()));
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn payload() -> QrPayload {
        QrPayload {
            lot_id: Uuid::new_v4(),
            reagent_name: "Glucose Oxidase".to_string(),
            lot_number: "LOT2024001".to_string(),
            manufacturer: Some("Labtest".to_string()),
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 31).unwrap(),
            quantity: 100.0,
            unit_measure: Some("ml".to_string()),
            location: Some("Fridge A2".to_string()),
            registered_at: Utc::now(),
            sig: None,
        }
    }

    #[test]
    fn signed_payload_verifies() {
        let signer = QrSigner::new("label-secret");
        let signed = signer.sign(payload()).unwrap();
        let text = serde_json::to_string(&signed).unwrap();

        assert_eq!(signer.verify(&text).unwrap(), signed);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = QrSigner::new("label-secret");
        let mut signed = signer.sign(payload()).unwrap();
        signed.quantity = 5000.0;
        let text = serde_json::to_string(&signed).unwrap();

        assert_matches!(signer.verify(&text), Err(LedgerError::InvalidQrPayload(msg)) if msg.contains("does not match"));
    }

    #[test]
    fn unsigned_and_foreign_payloads_are_rejected() {
        let signer = QrSigner::new("label-secret");
        let unsigned = serde_json::to_string(&payload()).unwrap();
        assert_matches!(signer.verify(&unsigned), Err(LedgerError::InvalidQrPayload(_)));

        let foreign = QrSigner::new("other-secret").sign(payload()).unwrap();
        let text = serde_json::to_string(&foreign).unwrap();
        assert_matches!(signer.verify(&text), Err(LedgerError::InvalidQrPayload(_)));

        assert_matches!(signer.verify("hello"), Err(LedgerError::InvalidQrPayload(_)));
    }
}
