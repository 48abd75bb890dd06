use crate::{AsValue, Entity, FieldMapping, Result, Row, TableMapping, Value};

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Region {
    pub id: i32,
    pub name: String,
    pub code: Option<String>,
    pub active: bool,
}

impl Entity for Region {
    fn mapping() -> TableMapping {
        TableMapping {
            type_name: "Region",
            table: Some("FD_Region"),
            fields: vec![
                FieldMapping {
                    field: "id",
                    column: Some("ID"),
                    prototype: Value::Int32(None),
                    ..Default::default()
                },
                FieldMapping {
                    field: "name",
                    column: Some("RegionName"),
                    prototype: Value::Varchar(None),
                    ..Default::default()
                },
                FieldMapping {
                    field: "code",
                    column: Some("RegionCode"),
                    prototype: Value::Varchar(None),
                    ..Default::default()
                },
                FieldMapping {
                    field: "active",
                    column: Some("Active"),
                    prototype: Value::Boolean(None),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }
    fn value(&self, field: usize) -> Value {
        match field {
            0 => self.id.as_value(),
            1 => self.name.clone().as_value(),
            2 => self.code.clone().as_value(),
            3 => self.active.as_value(),
            _ => Value::Null,
        }
    }
    fn set_value(&mut self, field: usize, value: Value) -> Result<()> {
        match field {
            0 => self.id = AsValue::try_from_value(value)?,
            1 => self.name = AsValue::try_from_value(value)?,
            2 => self.code = AsValue::try_from_value(value)?,
            3 => self.active = AsValue::try_from_value(value)?,
            _ => {}
        }
        Ok(())
    }
    fn row(&self) -> Row {
        (0..4).map(|i| self.value(i)).collect()
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Country {
    pub id: i64,
    pub region_id: i32,
    pub name: String,
}

impl Entity for Country {
    fn mapping() -> TableMapping {
        TableMapping {
            type_name: "Country",
            table: Some("FD_Country"),
            primary_key: Some("CountryID"),
            fields: vec![
                FieldMapping {
                    field: "id",
                    column: Some("CountryID"),
                    prototype: Value::Int64(None),
                    ..Default::default()
                },
                FieldMapping {
                    field: "region_id",
                    column: Some("RegionID"),
                    prototype: Value::Int32(None),
                    ..Default::default()
                },
                FieldMapping {
                    field: "name",
                    prototype: Value::Varchar(None),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }
    fn value(&self, field: usize) -> Value {
        match field {
            0 => self.id.as_value(),
            1 => self.region_id.as_value(),
            2 => self.name.clone().as_value(),
            _ => Value::Null,
        }
    }
    fn set_value(&mut self, field: usize, value: Value) -> Result<()> {
        match field {
            0 => self.id = AsValue::try_from_value(value)?,
            1 => self.region_id = AsValue::try_from_value(value)?,
            2 => self.name = AsValue::try_from_value(value)?,
            _ => {}
        }
        Ok(())
    }
    fn row(&self) -> Row {
        (0..3).map(|i| self.value(i)).collect()
    }
}
