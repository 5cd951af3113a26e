pub mod notification;
pub mod product;
pub mod promotion;
pub mod quote;
