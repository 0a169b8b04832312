//! Domain models for accounting-service.

mod catalog;
mod invoice;
mod ledger;
mod order;
mod tax;

pub use catalog::{Contact, InventoryRecord, Product};
pub use invoice::{
    CustomerInvoice, CustomerInvoiceItem, InvoiceWithItems, PaymentStatus, UserInvoice,
};
pub use ledger::{Account, DocumentRef, EntryType, LedgerTransaction};
pub use order::{
    NewPurchaseItem, NewPurchaseOrder, NewSalesItem, NewSalesOrder, OrderStatus, PurchaseOrder,
    PurchaseOrderItem, PurchaseOrderWithItems, SalesOrder, SalesOrderItem, SalesOrderWithItems,
};
pub use tax::{ComputationMethod, Tax, TaxSide};
