use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_object::{open_file, DefaultDicomObject};
use std::path::Path;
use tracing::trace;

use super::{Field, RecordHandle, RecordIo, RecordIoError};

/// Record I/O backed by the `dicom-object` library. Files are read fully into
/// memory so the source can be overwritten while the record is alive.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomFileIo;

#[derive(Debug)]
pub struct DicomHandle {
    object: DefaultDicomObject,
}

impl DicomHandle {
    pub fn object(&self) -> &DefaultDicomObject {
        &self.object
    }
}

fn tag_and_vr(field: Field) -> (Tag, VR) {
    match field {
        Field::PatientName => (Tag(0x0010, 0x0010), VR::PN),
        Field::PatientId => (Tag(0x0010, 0x0020), VR::LO),
        Field::AccessionNumber => (Tag(0x0008, 0x0050), VR::SH),
        Field::StudyDescription => (Tag(0x0008, 0x1030), VR::LO),
        Field::PatientBirthDate => (Tag(0x0010, 0x0030), VR::DA),
        Field::StudyDate => (Tag(0x0008, 0x0020), VR::DA),
        Field::SeriesInstanceUid => (Tag(0x0020, 0x000E), VR::UI),
        Field::SeriesDescription => (Tag(0x0008, 0x103E), VR::LO),
        Field::SopInstanceUid => (Tag(0x0008, 0x0018), VR::UI),
        Field::PatientSex => (Tag(0x0010, 0x0040), VR::CS),
        Field::PatientAddress => (Tag(0x0010, 0x1040), VR::LO),
        Field::PatientTelephoneNumbers => (Tag(0x0010, 0x2154), VR::SH),
        Field::InstitutionName => (Tag(0x0008, 0x0080), VR::LO),
        Field::ReferringPhysicianName => (Tag(0x0008, 0x0090), VR::PN),
        Field::InstitutionalDepartmentName => (Tag(0x0008, 0x1040), VR::LO),
        Field::OperatorsName => (Tag(0x0008, 0x1070), VR::PN),
    }
}

impl RecordIo for DicomFileIo {
    type Handle = DicomHandle;

    fn parse(&self, path: &Path) -> Result<DicomHandle, RecordIoError> {
        let object = open_file(path).map_err(|e| RecordIoError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(DicomHandle { object })
    }
}

impl RecordHandle for DicomHandle {
    fn get(&self, field: Field) -> Option<String> {
        let (tag, _) = tag_and_vr(field);
        let element = self.object.element(tag).ok()?;
        let value = element.to_str().ok()?;
        // Text values are padded to even length with spaces (or NUL for UIDs).
        Some(value.trim_end_matches(|c| c == '\0' || c == ' ').to_string())
    }

    fn set(&mut self, field: Field, value: &str) {
        let (tag, vr) = tag_and_vr(field);
        trace!("Setting {} = {:?}", field.keyword(), value);
        self.object
            .put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    }

    fn remove(&mut self, field: Field) {
        let (tag, _) = tag_and_vr(field);
        self.object.remove_element(tag);
    }

    fn save(&self, path: &Path) -> Result<(), RecordIoError> {
        self.object
            .write_to_file(path)
            .map_err(|e| RecordIoError::Save {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_object::mem::InMemElement;
    use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
    use std::fs;
    use tempfile::tempdir;

    fn write_sample(path: &Path) {
        let element = |tag: Tag, vr: VR, value: &str| -> InMemElement {
            DataElement::new(tag, vr, PrimitiveValue::from(value))
        };
        let object = InMemDicomObject::from_element_iter([
            element(Tag(0x0008, 0x0016), VR::UI, "1.2.840.10008.5.1.4.1.1.7"),
            element(Tag(0x0008, 0x0018), VR::UI, "1.2.3.4.5"),
            element(Tag(0x0008, 0x0020), VR::DA, "20240110"),
            element(Tag(0x0008, 0x0080), VR::LO, "GENERAL HOSPITAL"),
            element(Tag(0x0010, 0x0010), VR::PN, "DOE^JAN"),
            element(Tag(0x0010, 0x0020), VR::LO, "P-001"),
            element(Tag(0x0010, 0x0030), VR::DA, "19800215"),
            element(Tag(0x0010, 0x0040), VR::CS, "F"),
            element(Tag(0x0020, 0x000E), VR::UI, "1.2.3"),
        ]);
        let file = object
            .with_meta(FileMetaTableBuilder::new().transfer_syntax("1.2.840.10008.1.2.1"))
            .unwrap();
        file.write_to_file(path).unwrap();
    }

    #[test]
    fn test_get_trims_value_padding() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("img1.dcm");
        write_sample(&path);

        let handle = DicomFileIo.parse(&path).unwrap();
        // Both values have odd length and are padded on disk.
        assert_eq!(handle.get(Field::PatientName).as_deref(), Some("DOE^JAN"));
        assert_eq!(handle.get(Field::SeriesInstanceUid).as_deref(), Some("1.2.3"));
        assert_eq!(handle.get(Field::StudyDate).as_deref(), Some("20240110"));
        assert_eq!(handle.get(Field::AccessionNumber), None);
    }

    #[test]
    fn test_set_remove_and_save_survive_a_reparse() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("img1.dcm");
        write_sample(&path);

        let mut handle = DicomFileIo.parse(&path).unwrap();
        handle.set(Field::PatientName, "ANONYMOUS");
        handle.set(Field::PatientBirthDate, "19751231");
        handle.set(Field::AccessionNumber, "ACC-42");
        handle.remove(Field::PatientSex);
        handle.remove(Field::InstitutionName);
        // Removing a field that is not there is fine.
        handle.remove(Field::OperatorsName);
        handle.save(&path).unwrap();

        let reparsed = DicomFileIo.parse(&path).unwrap();
        assert_eq!(reparsed.get(Field::PatientName).as_deref(), Some("ANONYMOUS"));
        assert_eq!(reparsed.get(Field::PatientBirthDate).as_deref(), Some("19751231"));
        assert_eq!(reparsed.get(Field::AccessionNumber).as_deref(), Some("ACC-42"));
        assert_eq!(reparsed.get(Field::PatientSex), None);
        assert_eq!(reparsed.get(Field::InstitutionName), None);
        assert_eq!(reparsed.get(Field::PatientId).as_deref(), Some("P-001"));

        let birth_date = reparsed.object().element(Tag(0x0010, 0x0030)).unwrap();
        assert_eq!(birth_date.vr(), VR::DA);
        let accession = reparsed.object().element(Tag(0x0008, 0x0050)).unwrap();
        assert_eq!(accession.vr(), VR::SH);
        assert_eq!(reparsed.object().meta().media_storage_sop_instance_uid(), "1.2.3.4.5");
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "definitely not a structured record").unwrap();

        let result = DicomFileIo.parse(&path);
        assert!(matches!(result, Err(RecordIoError::Parse { .. })));
    }

    #[test]
    fn test_every_field_maps_to_a_distinct_tag() {
        let mut tags: Vec<Tag> = Field::KEY_FIELDS
            .iter()
            .chain(Field::IDENTIFYING.iter())
            .map(|f| tag_and_vr(*f).0)
            .collect();
        tags.sort();
        tags.dedup();
        // Birth date is both a key field and an identifying one.
        assert_eq!(tags.len(), 16);
    }
}
