pub mod database;
pub mod gemini;
pub mod razorpay;
pub mod subscription;
