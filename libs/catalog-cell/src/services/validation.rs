use std::collections::HashSet;

use crate::models::{CatalogError, CreateExamTypeRequest, CreateReagentRequest, UpdateReagentRequest};

pub fn validate_new_reagent(request: &CreateReagentRequest) -> Result<(), CatalogError> {
    if request.name.trim().is_empty() {
        return Err(CatalogError::ValidationError("Reagent name is required".to_string()));
    }
    if request.unit_measure.trim().is_empty() {
        return Err(CatalogError::ValidationError("Unit of measure is required".to_string()));
    }
    validate_minimum_stock(request.minimum_stock)
}

pub fn validate_reagent_update(request: &UpdateReagentRequest) -> Result<(), CatalogError> {
    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(CatalogError::ValidationError("Reagent name cannot be empty".to_string()));
        }
    }
    if let Some(unit) = &request.unit_measure {
        if unit.trim().is_empty() {
            return Err(CatalogError::ValidationError("Unit of measure cannot be empty".to_string()));
        }
    }
    if let Some(minimum) = request.minimum_stock {
        validate_minimum_stock(minimum)?;
    }
    Ok(())
}

fn validate_minimum_stock(minimum: f64) -> Result<(), CatalogError> {
    if !minimum.is_finite() || minimum < 0.0 {
        return Err(CatalogError::ValidationError("Minimum stock must be zero or greater".to_string()));
    }
    Ok(())
}

/// Every required reagent needs a positive quantity and may appear only once.
pub fn validate_exam_type(request: &CreateExamTypeRequest) -> Result<(), CatalogError> {
    if request.name.trim().is_empty() {
        return Err(CatalogError::ValidationError("Exam type name is required".to_string()));
    }

    let mut seen = HashSet::new();
    for required in &request.required_reagents {
        if !required.quantity.is_finite() || required.quantity <= 0.0 {
            return Err(CatalogError::ValidationError(format!(
                "Required quantity for reagent {} must be greater than zero",
                required.reagent_id
            )));
        }
        if !seen.insert(required.reagent_id) {
            return Err(CatalogError::ValidationError(format!(
                "Reagent {} is listed more than once",
                required.reagent_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    use crate::models::RequiredReagent;

    fn reagent(name: &str, unit: &str, minimum: f64) -> CreateReagentRequest {
        CreateReagentRequest {
            name: name.to_string(),
            description: None,
            reagent_type: None,
            unit_measure: unit.to_string(),
            minimum_stock: minimum,
            storage_conditions: None,
        }
    }

    #[test]
    fn reagent_needs_name_and_unit() {
        assert!(validate_new_reagent(&reagent("Buffer", "ml", 10.0)).is_ok());
        assert_matches!(validate_new_reagent(&reagent("  ", "ml", 0.0)), Err(CatalogError::ValidationError(_)));
        assert_matches!(validate_new_reagent(&reagent("Buffer", "", 0.0)), Err(CatalogError::ValidationError(_)));
        assert_matches!(validate_new_reagent(&reagent("Buffer", "ml", -1.0)), Err(CatalogError::ValidationError(_)));
    }

    #[test]
    fn update_checks_only_present_fields() {
        assert!(validate_reagent_update(&UpdateReagentRequest::default()).is_ok());

        let update = UpdateReagentRequest { minimum_stock: Some(-5.0), ..Default::default() };
        assert_matches!(validate_reagent_update(&update), Err(CatalogError::ValidationError(_)));
    }

    #[test]
    fn exam_type_rejects_zero_and_duplicate_reagents() {
        let reagent_id = Uuid::new_v4();
        let mut request = CreateExamTypeRequest {
            name: "Glucose panel".to_string(),
            description: None,
            required_reagents: vec![RequiredReagent { reagent_id, quantity: 2.5 }],
        };
        assert!(validate_exam_type(&request).is_ok());

        request.required_reagents.push(RequiredReagent { reagent_id, quantity: 1.0 });
        assert_matches!(validate_exam_type(&request), Err(CatalogError::ValidationError(msg)) if msg.contains("more than once"));

        request.required_reagents = vec![RequiredReagent { reagent_id, quantity: 0.0 }];
        assert_matches!(validate_exam_type(&request), Err(CatalogError::ValidationError(msg)) if msg.contains("greater than zero"));
    }
}
