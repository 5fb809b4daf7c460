// `pending` is set when the checkout session is created; the only transition
// out of it is to `paid`, driven by a verified completed-checkout event
#[derive(Debug, PartialEq, strum::AsRefStr)]
pub enum OrderStatus {
    #[strum(serialize = "pending")]
    Pending,
    #[strum(serialize = "paid")]
    Paid,
}
