pub mod expand;
pub mod highlight;
pub mod searchdata;
pub mod translate;
pub mod xml;
