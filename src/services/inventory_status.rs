use crate::entities::InventoryStatus;

/// Derives an item's lifecycle status from its available quantity.
///
/// First match wins:
/// 1. `Discontinued` is sticky and only cleared by an explicit update.
/// 2. `available <= 0` is `OutOfStock`.
/// 3. `available <= reorder_point` is `LowStock`.
/// 4. Everything else is `InStock`.
pub fn derive_status(
    available: i32,
    reorder_point: i32,
    current: InventoryStatus,
) -> InventoryStatus {
    if current == InventoryStatus::Discontinued {
        InventoryStatus::Discontinued
    } else if available <= 0 {
        InventoryStatus::OutOfStock
    } else if available <= reorder_point {
        InventoryStatus::LowStock
    } else {
        InventoryStatus::InStock
    }
}

/// True when a change from `before` to `after` should raise a low-stock alert.
pub fn crossed_into_low_stock(before: InventoryStatus, after: InventoryStatus) -> bool {
    before == InventoryStatus::InStock
        && matches!(after, InventoryStatus::LowStock | InventoryStatus::OutOfStock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 10, InventoryStatus::OutOfStock)]
    #[case(-3, 10, InventoryStatus::OutOfStock)]
    #[case(10, 10, InventoryStatus::LowStock)]
    #[case(1, 10, InventoryStatus::LowStock)]
    #[case(11, 10, InventoryStatus::InStock)]
    #[case(5, 0, InventoryStatus::InStock)]
    fn derives_from_available_and_reorder_point(
        #[case] available: i32,
        #[case] reorder_point: i32,
        #[case] expected: InventoryStatus,
    ) {
        assert_eq!(
            derive_status(available, reorder_point, InventoryStatus::InStock),
            expected
        );
    }

    #[test]
    fn low_stock_alert_only_on_downward_crossing() {
        assert!(crossed_into_low_stock(
            InventoryStatus::InStock,
            InventoryStatus::LowStock
        ));
        assert!(crossed_into_low_stock(
            InventoryStatus::InStock,
            InventoryStatus::OutOfStock
        ));
        assert!(!crossed_into_low_stock(
            InventoryStatus::LowStock,
            InventoryStatus::OutOfStock
        ));
        assert!(!crossed_into_low_stock(
            InventoryStatus::OutOfStock,
            InventoryStatus::InStock
        ));
    }

    proptest! {
        #[test]
        fn discontinued_is_sticky(available in -1000i32..1000, reorder_point in 0i32..500) {
            prop_assert_eq!(
                derive_status(available, reorder_point, InventoryStatus::Discontinued),
                InventoryStatus::Discontinued
            );
        }

        #[test]
        fn status_is_independent_of_previous_non_discontinued(
            available in -1000i32..1000,
            reorder_point in 0i32..500,
        ) {
            let from_in_stock = derive_status(available, reorder_point, InventoryStatus::InStock);
            let from_out = derive_status(available, reorder_point, InventoryStatus::OutOfStock);
            let from_low = derive_status(available, reorder_point, InventoryStatus::LowStock);
            prop_assert_eq!(from_in_stock, from_out);
            prop_assert_eq!(from_out, from_low);
        }

        #[test]
        fn in_stock_iff_above_reorder_point(available in 1i32..1000, reorder_point in 0i32..500) {
            let status = derive_status(available, reorder_point, InventoryStatus::InStock);
            prop_assert_eq!(status == InventoryStatus::InStock, available > reorder_point);
        }
    }
}
