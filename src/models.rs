/// Field holding the section date taken from the date heading.
pub const DATE_FIELD: &str = "日期";
pub const NAME_FIELD: &str = "姓名";
pub const AMOUNT_FIELD: &str = "交易金额";
pub const PAYMENT_FIELD: &str = "支付方式";
/// Derived column appended by the exporter.
pub const AMOUNT_VALUE_COLUMN: &str = "金额数值";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerType {
    New,
    Existing,
}

impl CustomerType {
    /// Text written into the mark column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "新增",
            Self::Existing => "存量",
        }
    }

    /// Solid background fill as 0xRRGGBB.
    pub fn fill(&self) -> u32 {
        match self {
            Self::New => 0xC6EFCE,
            Self::Existing => 0xFFEB9C,
        }
    }
}

/// One transaction parsed from the markdown log. Fields keep insertion order
/// so the exported columns follow the configured pattern order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionRecord {
    fields: Vec<(String, String)>,
}

impl TransactionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `name`, or "" when the field was never set.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Overwrite an existing field in place or append a new one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}
