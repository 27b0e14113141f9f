use crate::parcel::ParcelId;

/// Format the display label shown on the map for a parcel, e.g.
/// "사직동 344-1". Computed once when a record is first ingested.
///
/// Preference order: the trailing `<dong> <lot>` tokens of the provider's
/// jibun address, then a lot number decomposed from the PNU itself, then the
/// raw PNU.
pub fn format_display_label(id: &ParcelId, properties: &serde_json::Value) -> String {
    if let Some(addr) = address_property(properties)
        && let Some(label) = trailing_dong_and_lot(addr)
    {
        return label;
    }

    if let Some(lot) = pnu_lot_number(id.as_str()) {
        return lot;
    }

    id.as_str().to_string()
}

fn address_property(properties: &serde_json::Value) -> Option<&str> {
    for key in ["addr", "juso", "jibun"] {
        if let Some(value) = properties.get(key).and_then(|v| v.as_str()) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

/// Last two whitespace tokens of a jibun address: the administrative dong
/// (or ri) and the lot number. A single-token address is returned as-is.
fn trailing_dong_and_lot(addr: &str) -> Option<String> {
    let tokens: Vec<&str> = addr.split_whitespace().collect();
    match tokens.as_slice() {
        [] => None,
        [only] => Some((*only).to_string()),
        [.., dong, lot] => Some(format!("{dong} {lot}")),
    }
}

/// Decompose a 19-digit PNU into its lot number.
///
/// Layout: 10-digit legal-dong code, 1-digit land class (2 = mountain),
/// 4-digit principal number (bun), 4-digit sub-number (ji).
pub fn pnu_lot_number(pnu: &str) -> Option<String> {
    if pnu.len() != 19 || !pnu.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mountain = &pnu[10..11] == "2";
    let bun: u32 = pnu[11..15].parse().ok()?;
    let ji: u32 = pnu[15..19].parse().ok()?;
    if bun == 0 {
        return None;
    }

    let prefix = if mountain { "산" } else { "" };
    if ji == 0 {
        Some(format!("{prefix}{bun}"))
    } else {
        Some(format!("{prefix}{bun}-{ji}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{format_display_label, pnu_lot_number};
    use crate::parcel::ParcelId;

    fn id(pnu: &str) -> ParcelId {
        ParcelId::from(pnu)
    }

    #[test]
    fn label_prefers_trailing_address_tokens() {
        let properties = serde_json::json!({
            "pnu": "1111012900103440001",
            "addr": "서울특별시 종로구 사직동 344-1"
        });
        assert_eq!(
            format_display_label(&id("1111012900103440001"), &properties),
            "사직동 344-1"
        );
    }

    #[test]
    fn label_falls_back_to_pnu_lot_number() {
        let properties = serde_json::json!({});
        assert_eq!(
            format_display_label(&id("1111012900103440001"), &properties),
            "344-1"
        );
    }

    #[test]
    fn label_falls_back_to_raw_id_for_malformed_pnu() {
        let properties = serde_json::json!({ "addr": "   " });
        assert_eq!(format_display_label(&id("not-a-pnu"), &properties), "not-a-pnu");
    }

    #[test]
    fn pnu_lot_number_trims_leading_zeros_and_omits_zero_ji() {
        assert_eq!(
            pnu_lot_number("1111012900103440000").as_deref(),
            Some("344")
        );
        assert_eq!(
            pnu_lot_number("1111012900103440001").as_deref(),
            Some("344-1")
        );
    }

    #[test]
    fn pnu_lot_number_marks_mountain_parcels() {
        assert_eq!(
            pnu_lot_number("1111012900220150003").as_deref(),
            Some("산2015-3")
        );
    }

    #[test]
    fn pnu_lot_number_rejects_malformed_input() {
        assert!(pnu_lot_number("12345").is_none());
        assert!(pnu_lot_number("11110129001034400AB").is_none());
        assert!(pnu_lot_number("1111012900100000000").is_none());
    }
}
